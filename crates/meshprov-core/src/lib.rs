//! Core types and constants for the mesh provisioner state manager.
//!
//! This crate defines the newtype wrappers for mesh addressing and key
//! material, shared constants, and the error types used by the state
//! engines built on top of it.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod constants;
pub mod error;
pub mod types;

pub use error::{InvalidAddress, InvalidLength};
pub use types::{DeviceUuid, KeyIndex, KeyMaterial, MeshAddr, UnicastAddr};

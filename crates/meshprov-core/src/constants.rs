//! Protocol constants shared across the provisioner crates.

/// Length in bytes of NetKey and AppKey material.
pub const KEY_LEN: usize = 16;

/// Length in bytes of a device UUID.
pub const UUID_LEN: usize = 16;

/// Highest assignable key index. `0xFFFF` is reserved as the
/// auto-allocation marker.
pub const KEY_INDEX_MAX: u16 = 0xFFFE;

/// Key index value requesting internal allocation of the lowest unused index.
pub const KEY_INDEX_AUTO: u16 = 0xFFFF;

/// Company identifier meaning "bind by model id only" (local vendor model).
pub const COMPANY_ID_NONE: u16 = 0xFFFF;

/// Maximum byte length of a provisioned node's name.
pub const MAX_NODE_NAME_LEN: usize = 31;

/// Sentinel node index used by legacy callers for "no such node".
///
/// Lookup operations return `Option` instead; this constant exists only for
/// interoperating with wire formats that still carry the sentinel.
pub const INVALID_NODE_INDEX: u16 = 0xFFFF;

/// The unassigned mesh address.
pub const ADDR_UNASSIGNED: u16 = 0x0000;

/// Highest unicast address. Unicast addresses are `0x0001..=0x7FFF`.
pub const UNICAST_ADDR_MAX: u16 = 0x7FFF;

/// First virtual address. Virtual addresses are `0x8000..=0xBFFF`.
pub const VIRTUAL_ADDR_START: u16 = 0x8000;

/// First group address. Group addresses are `0xC000..=0xFFFF`, with
/// `0xFF00..=0xFFFF` reserved for fixed groups.
pub const GROUP_ADDR_START: u16 = 0xC000;

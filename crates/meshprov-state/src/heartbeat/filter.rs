//! Whitelist/blacklist engine over heartbeat `(src, dst)` pairs.
//!
//! The filter has exactly one mode. Changing the mode clears every entry:
//! an empty blacklist passes everything, an empty whitelist drops
//! everything. Entry expiry is only interpreted in whitelist mode; expired
//! entries are lazily evicted during evaluation.

use meshprov_core::types::{MeshAddr, UnicastAddr};

use crate::error::FilterError;

/// Filter-wide matching mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    Whitelist,
    #[default]
    Blacklist,
}

/// A single filter entry.
///
/// At least one of `src`/`dst` is set. `deadline` is an absolute time in
/// seconds; `None` means valid indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterEntry {
    pub src: Option<UnicastAddr>,
    pub dst: Option<MeshAddr>,
    pub deadline: Option<u64>,
}

impl FilterEntry {
    /// Whether the entry matches an incoming `(src, dst)` pair.
    ///
    /// An unset field matches anything; a set field must be equal.
    #[must_use]
    fn matches(&self, src: UnicastAddr, dst: MeshAddr) -> bool {
        self.src.is_none_or(|s| s == src) && self.dst.is_none_or(|d| d == dst)
    }

    /// Whether the entry references the given address in either field.
    #[must_use]
    fn references_src(&self, src: UnicastAddr) -> bool {
        self.src == Some(src)
    }

    #[must_use]
    fn references_dst(&self, dst: MeshAddr) -> bool {
        self.dst == Some(dst)
    }

    /// Expired strictly after the deadline, matching the `now > deadline`
    /// convention used elsewhere in the stack.
    #[must_use]
    fn is_expired(&self, now: u64) -> bool {
        self.deadline.is_some_and(|d| now > d)
    }
}

/// A filter maintenance operation, dispatched by `set_filter_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    /// Add or update an entry. `expiry` in seconds is relative to the call
    /// time; 0 means indefinite. Only interpreted in whitelist mode.
    Add {
        src: Option<UnicastAddr>,
        dst: Option<MeshAddr>,
        expiry: u32,
    },
    /// Remove matching entries.
    Remove {
        src: Option<UnicastAddr>,
        dst: Option<MeshAddr>,
    },
    /// Remove every entry, keeping the mode.
    Clean,
}

/// Decision for an incoming heartbeat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatDecision {
    /// Report the heartbeat to the application layer.
    Report,
    /// Drop the heartbeat.
    Drop { reason: DropReason },
}

/// Reason a heartbeat was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Heartbeat processing has not been started.
    NotStarted,
    /// A blacklist entry matched the message.
    BlacklistMatch,
    /// No unexpired whitelist entry matched the message.
    NotWhitelisted,
}

/// Heartbeat filter state.
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct HeartbeatFilter {
    started: bool,
    mode: FilterMode,
    entries: Vec<FilterEntry>,
}

impl HeartbeatFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable heartbeat processing with an empty blacklist.
    ///
    /// An empty blacklist means every received heartbeat is reported.
    /// Calling `start` again resets the filter to that initial state.
    pub fn start(&mut self) {
        self.started = true;
        self.mode = FilterMode::Blacklist;
        self.entries.clear();
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started
    }

    #[must_use]
    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    /// Current entries, expired ones included until the next evaluation.
    #[must_use]
    pub fn entries(&self) -> &[FilterEntry] {
        &self.entries
    }

    /// Set the filter mode.
    ///
    /// Changing the mode clears all entries; switching into whitelist mode
    /// therefore drops everything until entries are added.
    pub fn set_filter_type(&mut self, mode: FilterMode) -> Result<(), FilterError> {
        if !self.started {
            return Err(FilterError::NotStarted);
        }
        if mode != self.mode {
            self.mode = mode;
            self.entries.clear();
        }
        Ok(())
    }

    /// Add, remove, or clean filter entries.
    pub fn set_filter_info(&mut self, op: FilterOp, now: u64) -> Result<(), FilterError> {
        if !self.started {
            return Err(FilterError::NotStarted);
        }
        match op {
            FilterOp::Add { src, dst, expiry } => self.add_entry(src, dst, expiry, now),
            FilterOp::Remove { src, dst } => self.remove_entries(src, dst),
            FilterOp::Clean => {
                self.entries.clear();
                Ok(())
            }
        }
    }

    fn add_entry(
        &mut self,
        src: Option<UnicastAddr>,
        dst: Option<MeshAddr>,
        expiry: u32,
        now: u64,
    ) -> Result<(), FilterError> {
        if let Some(dst) = dst {
            if !dst.is_unicast() && !dst.is_group() {
                return Err(FilterError::InvalidArgument(
                    "destination must be a unicast or group address",
                ));
            }
        }

        // Expiry only applies to whitelist entries; 0 means indefinite.
        let deadline = match (self.mode, expiry) {
            (FilterMode::Whitelist, e) if e > 0 => Some(now + u64::from(e)),
            _ => None,
        };

        match (src, dst) {
            (None, None) => Err(FilterError::InvalidArgument(
                "neither source nor destination set",
            )),
            (Some(src), Some(dst)) => {
                // Both addresses given: erase every entry referencing either,
                // then insert one fresh entry carrying both.
                self.entries
                    .retain(|e| !e.references_src(src) && !e.references_dst(dst));
                self.entries.push(FilterEntry {
                    src: Some(src),
                    dst: Some(dst),
                    deadline,
                });
                Ok(())
            }
            (Some(src), None) => {
                if let Some(entry) = self.entries.iter_mut().find(|e| e.references_src(src)) {
                    entry.deadline = deadline;
                } else {
                    self.entries.push(FilterEntry {
                        src: Some(src),
                        dst: None,
                        deadline,
                    });
                }
                Ok(())
            }
            (None, Some(dst)) => {
                if let Some(entry) = self.entries.iter_mut().find(|e| e.references_dst(dst)) {
                    entry.deadline = deadline;
                } else {
                    self.entries.push(FilterEntry {
                        src: None,
                        dst: Some(dst),
                        deadline,
                    });
                }
                Ok(())
            }
        }
    }

    fn remove_entries(
        &mut self,
        src: Option<UnicastAddr>,
        dst: Option<MeshAddr>,
    ) -> Result<(), FilterError> {
        match (src, dst) {
            (None, None) => Err(FilterError::InvalidArgument(
                "neither source nor destination set",
            )),
            (Some(src), Some(dst)) => {
                // Exact match on both fields.
                self.entries
                    .retain(|e| !(e.src == Some(src) && e.dst == Some(dst)));
                Ok(())
            }
            (Some(src), None) => {
                self.entries.retain(|e| !e.references_src(src));
                Ok(())
            }
            (None, Some(dst)) => {
                self.entries.retain(|e| !e.references_dst(dst));
                Ok(())
            }
        }
    }

    /// Decide whether an incoming heartbeat passes the filter.
    ///
    /// Expired whitelist entries are evicted before matching so a lapsed
    /// entry reports "no active filter" rather than a stale pass.
    pub fn evaluate(&mut self, src: UnicastAddr, dst: MeshAddr, now: u64) -> HeartbeatDecision {
        if !self.started {
            return HeartbeatDecision::Drop {
                reason: DropReason::NotStarted,
            };
        }

        match self.mode {
            FilterMode::Blacklist => {
                if self.entries.iter().any(|e| e.matches(src, dst)) {
                    HeartbeatDecision::Drop {
                        reason: DropReason::BlacklistMatch,
                    }
                } else {
                    HeartbeatDecision::Report
                }
            }
            FilterMode::Whitelist => {
                self.entries.retain(|e| !e.is_expired(now));
                if self.entries.iter().any(|e| e.matches(src, dst)) {
                    HeartbeatDecision::Report
                } else {
                    HeartbeatDecision::Drop {
                        reason: DropReason::NotWhitelisted,
                    }
                }
            }
        }
    }
}

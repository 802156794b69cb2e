//! Error types for the provisioner state engines.

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum KeyStoreError {
    #[error("duplicate key index: 0x{0:03x}")]
    DuplicateKey(u16),

    #[error("key index not found: 0x{0:03x}")]
    NotFound(u16),

    #[error("no unused key index left to allocate")]
    IndexExhausted,

    #[error("app key 0x{app_index:03x} is not bound to net key 0x{net_index:03x}")]
    BindingMismatch { app_index: u16, net_index: u16 },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NodeTableError {
    #[error("node table full: capacity {0}")]
    TableFull(usize),

    #[error("duplicate node: {0}")]
    DuplicateNode(&'static str),

    #[error("node not found")]
    NotFound,

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("heartbeat processing not started")]
    NotStarted,

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keystore_error_display() {
        let err = KeyStoreError::DuplicateKey(0x005);
        assert_eq!(err.to_string(), "duplicate key index: 0x005");

        let err = KeyStoreError::BindingMismatch {
            app_index: 0x001,
            net_index: 0x002,
        };
        assert_eq!(
            err.to_string(),
            "app key 0x001 is not bound to net key 0x002"
        );
    }

    #[test]
    fn node_table_error_display() {
        let err = NodeTableError::TableFull(16);
        assert_eq!(err.to_string(), "node table full: capacity 16");

        let err = NodeTableError::DuplicateNode("unicast address already provisioned");
        assert_eq!(
            err.to_string(),
            "duplicate node: unicast address already provisioned"
        );
    }

    #[test]
    fn filter_error_display() {
        let err = FilterError::NotStarted;
        assert_eq!(err.to_string(), "heartbeat processing not started");

        let err = FilterError::InvalidArgument("neither source nor destination set");
        assert_eq!(
            err.to_string(),
            "invalid argument: neither source nor destination set"
        );
    }
}

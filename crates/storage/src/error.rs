//! Storage Fault Types

use crate::consistency::ConsistencyLevel;
use thiserror::Error;

/// Faults raised by a storage session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageFault {
    /// Coordinator refused the operation: fewer live replicas than the
    /// consistency level demands
    #[error("Cannot achieve consistency level {consistency}: required {required} replicas, alive {alive}")]
    Unavailable {
        consistency: ConsistencyLevel,
        required: usize,
        alive: usize,
    },

    /// Every host in the query plan failed
    #[error("Unable to complete the operation against any hosts: {}", format_host_faults(.errors))]
    NoHostAvailable { errors: Vec<HostFault> },

    /// Host did not accept a connection
    #[error("Connection refused by {host}")]
    ConnectionRefused { host: String },

    /// Replicas accepted the write but did not acknowledge in time
    #[error("Write timed out at consistency {consistency}: received {received} of {required} acknowledgements")]
    WriteTimeout {
        consistency: ConsistencyLevel,
        received: usize,
        required: usize,
    },

    /// Replicas did not answer a read in time
    #[error("Read timed out at consistency {consistency}: received {received} of {required} responses")]
    ReadTimeout {
        consistency: ConsistencyLevel,
        received: usize,
        required: usize,
    },

    /// Client gave up waiting on the request
    #[error("Operation timed out after {elapsed_ms}ms")]
    OperationTimedOut { elapsed_ms: u64 },

    /// Statement rejected by the server
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Anything else reported by the driver
    #[error("{0}")]
    Other(String),
}

/// Fault observed on one host while executing a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFault {
    pub host: String,
    pub fault: StorageFault,
}

impl HostFault {
    pub fn new(host: impl Into<String>, fault: StorageFault) -> Self {
        Self {
            host: host.into(),
            fault,
        }
    }
}

fn format_host_faults(errors: &[HostFault]) -> String {
    if errors.is_empty() {
        return "no hosts tried".to_string();
    }
    errors
        .iter()
        .map(|e| format!("{}: {}", e.host, e.fault))
        .collect::<Vec<_>>()
        .join("; ")
}

impl StorageFault {
    /// Short name of the fault kind
    pub fn kind(&self) -> &'static str {
        match self {
            StorageFault::Unavailable { .. } => "unavailable",
            StorageFault::NoHostAvailable { .. } => "no_host_available",
            StorageFault::ConnectionRefused { .. } => "connection_refused",
            StorageFault::WriteTimeout { .. } => "write_timeout",
            StorageFault::ReadTimeout { .. } => "read_timeout",
            StorageFault::OperationTimedOut { .. } => "operation_timed_out",
            StorageFault::InvalidQuery(_) => "invalid_query",
            StorageFault::Other(_) => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_message() {
        let fault = StorageFault::Unavailable {
            consistency: ConsistencyLevel::Three,
            required: 3,
            alive: 2,
        };
        assert_eq!(
            fault.to_string(),
            "Cannot achieve consistency level THREE: required 3 replicas, alive 2"
        );
    }

    #[test]
    fn test_no_host_available_lists_hosts() {
        let fault = StorageFault::NoHostAvailable {
            errors: vec![
                HostFault::new("db-1", StorageFault::ConnectionRefused { host: "db-1".into() }),
                HostFault::new("db-2", StorageFault::ConnectionRefused { host: "db-2".into() }),
            ],
        };
        let message = fault.to_string();
        assert!(message.contains("db-1: Connection refused by db-1"));
        assert!(message.contains("db-2"));
    }

    #[test]
    fn test_no_host_available_empty() {
        let fault = StorageFault::NoHostAvailable { errors: vec![] };
        assert!(fault.to_string().ends_with("no hosts tried"));
    }

    #[test]
    fn test_other_may_be_empty() {
        assert_eq!(StorageFault::Other(String::new()).to_string(), "");
        assert_eq!(StorageFault::Other(String::new()).kind(), "other");
    }
}

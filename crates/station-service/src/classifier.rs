//! Storage Failure Classification

use storage::StorageFault;

/// Describe a storage fault for the caller
///
/// Replica shortages are reported with the exact counts, including when they
/// are nested inside a `NoHostAvailable`. Everything else falls back to the
/// fault's own description. Never returns an empty string.
pub fn classify(fault: &StorageFault) -> String {
    match fault {
        StorageFault::Unavailable {
            required, alive, ..
        } => replica_shortage(*required, *alive),
        StorageFault::NoHostAvailable { errors } => errors
            .iter()
            .find_map(|host| match &host.fault {
                StorageFault::Unavailable {
                    required, alive, ..
                } => Some(replica_shortage(*required, *alive)),
                _ => None,
            })
            .unwrap_or_else(|| describe(fault)),
        StorageFault::ConnectionRefused { .. }
        | StorageFault::WriteTimeout { .. }
        | StorageFault::ReadTimeout { .. }
        | StorageFault::OperationTimedOut { .. }
        | StorageFault::InvalidQuery(_)
        | StorageFault::Other(_) => describe(fault),
    }
}

fn replica_shortage(required: usize, alive: usize) -> String {
    format!("need {} replicas, but only have {}", required, alive)
}

fn describe(fault: &StorageFault) -> String {
    let message = fault.to_string();
    if message.trim().is_empty() {
        format!("storage fault: {}", fault.kind())
    } else {
        message
    }
}

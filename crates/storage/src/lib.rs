//! Storage Layer
//!
//! Consistency-scoped access to the replicated `stations` table.
//!
//! The [`StationStore`] gateway prepares its two query templates once and
//! executes them through a [`Session`]. [`MemoryCluster`] is an in-process
//! replicated cluster implementing the same session interface.

mod consistency;
mod error;
mod gateway;
mod memory;
mod session;

pub use consistency::ConsistencyLevel;
pub use error::{HostFault, StorageFault};
pub use gateway::{StationStore, READ_CONSISTENCY, WRITE_CONSISTENCY};
pub use memory::MemoryCluster;
pub use session::{CqlValue, PreparedStatement, QueryResult, Row, Session};

/// Name of the readings table inside the keyspace
pub const STATIONS_TABLE: &str = "stations";

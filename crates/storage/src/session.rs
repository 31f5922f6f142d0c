//! Session Interface
//!
//! The seam between the gateway and a column-store cluster: statement
//! preparation, execution at a consistency level, and the result shape.

use crate::consistency::ConsistencyLevel;
use crate::error::StorageFault;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

/// Bound value or result cell
#[derive(Debug, Clone, PartialEq)]
pub enum CqlValue {
    Text(String),
    Int(i32),
    Date(NaiveDate),
    Tuple(Vec<CqlValue>),
}

impl CqlValue {
    pub fn as_int(&self) -> Option<i32> {
        match self {
            CqlValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

/// A statement compiled once by the cluster and executed many times
///
/// Cloning is cheap: the query text is shared.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedStatement {
    id: u64,
    query: Arc<str>,
    consistency: ConsistencyLevel,
}

impl PreparedStatement {
    pub fn new(id: u64, query: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            query: query.into(),
            consistency: ConsistencyLevel::default(),
        }
    }

    /// Same statement, executed at a different consistency level
    pub fn with_consistency(mut self, consistency: ConsistencyLevel) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn consistency(&self) -> ConsistencyLevel {
        self.consistency
    }
}

/// One result row; `None` is a null column
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub columns: Vec<Option<CqlValue>>,
}

impl Row {
    pub fn new(columns: Vec<Option<CqlValue>>) -> Self {
        Self { columns }
    }

    /// Column value, `None` when null or out of range
    pub fn get(&self, index: usize) -> Option<&CqlValue> {
        self.columns.get(index).and_then(|c| c.as_ref())
    }
}

/// Rows returned by a statement; empty for writes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub rows: Vec<Row>,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn first_row(&self) -> Option<&Row> {
        self.rows.first()
    }
}

/// Connection to a column-store cluster
///
/// Implementations are shared across concurrent requests.
#[async_trait]
pub trait Session: Send + Sync {
    /// Compile a statement on the cluster
    async fn prepare(&self, cql: &str) -> Result<PreparedStatement, StorageFault>;

    /// Execute a prepared statement once at its consistency level
    async fn execute(
        &self,
        statement: &PreparedStatement,
        values: &[CqlValue],
    ) -> Result<QueryResult, StorageFault>;
}

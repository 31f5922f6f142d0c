//! Station Storage Gateway
//!
//! Maps the two logical operations onto prepared statements with their own
//! consistency levels. Writes need one replica, reads of the maximum need
//! three.

use crate::consistency::ConsistencyLevel;
use crate::error::StorageFault;
use crate::session::{CqlValue, PreparedStatement, QueryResult, Session};
use crate::STATIONS_TABLE;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Consistency of reading upserts
pub const WRITE_CONSISTENCY: ConsistencyLevel = ConsistencyLevel::One;

/// Consistency of the per-station maximum
pub const READ_CONSISTENCY: ConsistencyLevel = ConsistencyLevel::Three;

pub(crate) fn insert_reading_cql(keyspace: &str) -> String {
    format!(
        "INSERT INTO {}.{} (id, date, record) VALUES (?, ?, ?)",
        keyspace, STATIONS_TABLE
    )
}

pub(crate) fn station_max_cql(keyspace: &str) -> String {
    format!(
        "SELECT MAX(record.tmax) FROM {}.{} WHERE id = ?",
        keyspace, STATIONS_TABLE
    )
}

/// Gateway to the `stations` table
///
/// Both statements are prepared in [`StationStore::prepare`] and never
/// rebuilt; each call binds values and executes exactly once.
pub struct StationStore {
    session: Arc<dyn Session>,
    insert_reading: PreparedStatement,
    station_max: PreparedStatement,
    /// Client-side deadline per execution, `None` waits indefinitely
    request_timeout: Option<Duration>,
}

impl StationStore {
    /// Prepare the query templates against `keyspace`
    pub async fn prepare(session: Arc<dyn Session>, keyspace: &str) -> Result<Self, StorageFault> {
        let insert_reading = session
            .prepare(&insert_reading_cql(keyspace))
            .await?
            .with_consistency(WRITE_CONSISTENCY);
        let station_max = session
            .prepare(&station_max_cql(keyspace))
            .await?
            .with_consistency(READ_CONSISTENCY);

        info!(
            "Prepared station statements on keyspace {} (write={}, read={})",
            keyspace,
            insert_reading.consistency(),
            station_max.consistency()
        );

        Ok(Self {
            session,
            insert_reading,
            station_max,
            request_timeout: None,
        })
    }

    /// Bound every execution by `timeout`
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Upsert the range recorded for `station` on `date`
    pub async fn record_reading(
        &self,
        station: &str,
        date: NaiveDate,
        tmin: i32,
        tmax: i32,
    ) -> Result<(), StorageFault> {
        debug!("Recording {} on {}: ({}, {})", station, date, tmin, tmax);
        let values = [
            CqlValue::Text(station.to_string()),
            CqlValue::Date(date),
            CqlValue::Tuple(vec![CqlValue::Int(tmin), CqlValue::Int(tmax)]),
        ];
        self.execute(&self.insert_reading, &values).await?;
        Ok(())
    }

    /// Highest `tmax` recorded for `station`, `None` when it has no readings
    pub async fn station_maximum(&self, station: &str) -> Result<Option<i32>, StorageFault> {
        let values = [CqlValue::Text(station.to_string())];
        let result = self.execute(&self.station_max, &values).await?;

        // No row and a null aggregate both mean no data
        let max = match result.first_row().and_then(|row| row.get(0)) {
            None => None,
            Some(CqlValue::Int(v)) => Some(*v),
            Some(other) => {
                return Err(StorageFault::Other(format!(
                    "unexpected MAX(record.tmax) value: {:?}",
                    other
                )))
            }
        };

        debug!("Maximum for {}: {:?}", station, max);
        Ok(max)
    }

    pub fn insert_statement(&self) -> &PreparedStatement {
        &self.insert_reading
    }

    pub fn max_statement(&self) -> &PreparedStatement {
        &self.station_max
    }

    async fn execute(
        &self,
        statement: &PreparedStatement,
        values: &[CqlValue],
    ) -> Result<QueryResult, StorageFault> {
        match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, self.session.execute(statement, values))
                .await
                .map_err(|_| StorageFault::OperationTimedOut {
                    elapsed_ms: limit.as_millis() as u64,
                })?,
            None => self.session.execute(statement, values).await,
        }
    }
}

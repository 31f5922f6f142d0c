//! In-Memory Replicated Cluster
//!
//! A `Session` backed by a fixed set of in-process replica nodes. Every node
//! holds a full copy of the `stations` table (replication factor equals the
//! node count). Nodes can be taken down and brought back to exercise the
//! consistency rules of the gateway.

use crate::error::{HostFault, StorageFault};
use crate::gateway::{insert_reading_cql, station_max_cql};
use crate::session::{CqlValue, PreparedStatement, QueryResult, Row, Session};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Default contact points of a local three node cluster
pub const DEFAULT_NODES: [&str; 3] = ["db-1", "db-2", "db-3"];

/// Statements the cluster knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatementShape {
    InsertReading,
    StationMax,
}

/// Stored range with its write timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cell {
    tmin: i32,
    tmax: i32,
    written_at: u64,
}

type StationRows = BTreeMap<String, BTreeMap<NaiveDate, Cell>>;

/// One replica
struct Node {
    name: String,
    up: AtomicBool,
    rows: Mutex<StationRows>,
}

/// In-process replicated column store
pub struct MemoryCluster {
    keyspace: String,
    nodes: Vec<Node>,
    statements: Mutex<HashMap<u64, StatementShape>>,
    next_statement_id: AtomicU64,
    write_clock: AtomicU64,
    executions: AtomicU64,
    injected: Mutex<VecDeque<StorageFault>>,
}

impl MemoryCluster {
    /// Create a cluster with the given node names, all up
    pub fn new<I, S>(keyspace: &str, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let nodes: Vec<Node> = nodes
            .into_iter()
            .map(|name| Node {
                name: name.into(),
                up: AtomicBool::new(true),
                rows: Mutex::new(BTreeMap::new()),
            })
            .collect();

        info!(
            "Creating in-memory cluster: keyspace={}, replication_factor={}",
            keyspace,
            nodes.len()
        );

        Self {
            keyspace: keyspace.to_string(),
            nodes,
            statements: Mutex::new(HashMap::new()),
            next_statement_id: AtomicU64::new(1),
            write_clock: AtomicU64::new(0),
            executions: AtomicU64::new(0),
            injected: Mutex::new(VecDeque::new()),
        }
    }

    /// Three node cluster named `db-1`..`db-3`
    pub fn local(keyspace: &str) -> Self {
        Self::new(keyspace, DEFAULT_NODES)
    }

    pub fn replication_factor(&self) -> usize {
        self.nodes.len()
    }

    /// Mark a node up or down. Returns false for an unknown node.
    pub fn set_node_up(&self, name: &str, up: bool) -> bool {
        match self.nodes.iter().find(|n| n.name == name) {
            Some(node) => {
                node.up.store(up, Ordering::SeqCst);
                info!("Node {} is now {}", name, if up { "up" } else { "down" });
                true
            }
            None => false,
        }
    }

    /// Node names with their liveness, in contact-point order
    pub fn node_status(&self) -> Vec<(String, bool)> {
        self.nodes
            .iter()
            .map(|n| (n.name.clone(), n.up.load(Ordering::SeqCst)))
            .collect()
    }

    pub fn alive_nodes(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.up.load(Ordering::SeqCst))
            .count()
    }

    /// Statement executions attempted so far, failed ones included
    pub fn executions(&self) -> u64 {
        self.executions.load(Ordering::SeqCst)
    }

    /// Fail the next execution with `fault`
    pub fn inject_fault(&self, fault: StorageFault) {
        if let Ok(mut queue) = self.injected.lock() {
            queue.push_back(fault);
        }
    }

    fn recognize(&self, cql: &str) -> Option<StatementShape> {
        let wanted = normalize(cql);
        if wanted == normalize(&insert_reading_cql(&self.keyspace)) {
            Some(StatementShape::InsertReading)
        } else if wanted == normalize(&station_max_cql(&self.keyspace)) {
            Some(StatementShape::StationMax)
        } else {
            None
        }
    }

    fn live_nodes(&self) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|n| n.up.load(Ordering::SeqCst))
            .collect()
    }

    fn insert_reading(&self, live: &[&Node], values: &[CqlValue]) -> Result<(), StorageFault> {
        let (station, date, tmin, tmax) = match values {
            [CqlValue::Text(station), CqlValue::Date(date), CqlValue::Tuple(range)] => {
                match range.as_slice() {
                    [CqlValue::Int(tmin), CqlValue::Int(tmax)] => (station, *date, *tmin, *tmax),
                    _ => {
                        return Err(StorageFault::InvalidQuery(
                            "record must be a tuple of two ints".to_string(),
                        ))
                    }
                }
            }
            _ => {
                return Err(StorageFault::InvalidQuery(format!(
                    "expected (text, date, tuple<int, int>), got {} values",
                    values.len()
                )))
            }
        };

        let cell = Cell {
            tmin,
            tmax,
            written_at: self.write_clock.fetch_add(1, Ordering::SeqCst) + 1,
        };

        for node in live {
            let mut rows = node.rows.lock().map_err(|e| {
                StorageFault::Other(format!("Lock error on {}: {}", node.name, e))
            })?;
            store_cell(&mut rows, station, date, cell);
        }

        debug!(
            "Wrote {}@{} to {} replicas (ts={})",
            station,
            date,
            live.len(),
            cell.written_at
        );
        Ok(())
    }

    fn station_max(&self, replicas: &[&Node], values: &[CqlValue]) -> Result<QueryResult, StorageFault> {
        let station = match values {
            [CqlValue::Text(station)] => station,
            _ => {
                return Err(StorageFault::InvalidQuery(
                    "expected a single text id".to_string(),
                ))
            }
        };

        // Reconcile replicas per date, newest write wins
        let mut merged: BTreeMap<NaiveDate, Cell> = BTreeMap::new();
        for node in replicas {
            let rows = node.rows.lock().map_err(|e| {
                StorageFault::Other(format!("Lock error on {}: {}", node.name, e))
            })?;
            if let Some(readings) = rows.get(station) {
                for (date, cell) in readings {
                    merged
                        .entry(*date)
                        .and_modify(|current| {
                            if cell.written_at > current.written_at {
                                *current = *cell;
                            }
                        })
                        .or_insert(*cell);
                }
            }
        }

        let max = merged.values().map(|c| c.tmax).max();
        debug!(
            "MAX(tmax) for {} over {} readings from {} replicas: {:?}",
            station,
            merged.len(),
            replicas.len(),
            max
        );

        // Aggregates always produce exactly one row
        Ok(QueryResult {
            rows: vec![Row::new(vec![max.map(CqlValue::Int)])],
        })
    }
}

#[async_trait]
impl Session for MemoryCluster {
    async fn prepare(&self, cql: &str) -> Result<PreparedStatement, StorageFault> {
        let shape = self
            .recognize(cql)
            .ok_or_else(|| StorageFault::InvalidQuery(format!("unsupported statement: {}", cql)))?;

        let id = self.next_statement_id.fetch_add(1, Ordering::SeqCst);
        self.statements
            .lock()
            .map_err(|e| StorageFault::Other(format!("Lock error: {}", e)))?
            .insert(id, shape);

        debug!("Prepared statement {} as {:?}", id, shape);
        Ok(PreparedStatement::new(id, cql))
    }

    async fn execute(
        &self,
        statement: &PreparedStatement,
        values: &[CqlValue],
    ) -> Result<QueryResult, StorageFault> {
        self.executions.fetch_add(1, Ordering::SeqCst);

        let injected = self
            .injected
            .lock()
            .map_err(|e| StorageFault::Other(format!("Lock error: {}", e)))?
            .pop_front();
        if let Some(fault) = injected {
            warn!("Failing statement {} with injected fault: {}", statement.id(), fault);
            return Err(fault);
        }

        let shape = self
            .statements
            .lock()
            .map_err(|e| StorageFault::Other(format!("Lock error: {}", e)))?
            .get(&statement.id())
            .copied()
            .ok_or_else(|| {
                StorageFault::InvalidQuery(format!("unprepared statement id {}", statement.id()))
            })?;

        let live = self.live_nodes();
        if live.is_empty() {
            let errors = self
                .nodes
                .iter()
                .map(|n| {
                    HostFault::new(
                        n.name.clone(),
                        StorageFault::ConnectionRefused {
                            host: n.name.clone(),
                        },
                    )
                })
                .collect();
            return Err(StorageFault::NoHostAvailable { errors });
        }

        let consistency = statement.consistency();
        let required = consistency.required_replicas(self.replication_factor());
        if live.len() < required {
            return Err(StorageFault::Unavailable {
                consistency,
                required,
                alive: live.len(),
            });
        }

        match shape {
            StatementShape::InsertReading => {
                self.insert_reading(&live, values)?;
                Ok(QueryResult::empty())
            }
            StatementShape::StationMax => self.station_max(&live[..required], values),
        }
    }
}

/// Keep whichever of the stored and incoming cells was written last
fn store_cell(rows: &mut StationRows, station: &str, date: NaiveDate, cell: Cell) {
    rows.entry(station.to_string())
        .or_default()
        .entry(date)
        .and_modify(|current| {
            if cell.written_at > current.written_at {
                *current = cell;
            }
        })
        .or_insert(cell);
}

fn normalize(cql: &str) -> String {
    cql.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(';')
        .to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consistency::ConsistencyLevel;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn reading(station: &str, day: u32, tmin: i32, tmax: i32) -> Vec<CqlValue> {
        vec![
            CqlValue::Text(station.to_string()),
            CqlValue::Date(date(day)),
            CqlValue::Tuple(vec![CqlValue::Int(tmin), CqlValue::Int(tmax)]),
        ]
    }

    async fn prepared(cluster: &MemoryCluster) -> (PreparedStatement, PreparedStatement) {
        let insert = cluster
            .prepare(&insert_reading_cql("weather"))
            .await
            .unwrap()
            .with_consistency(ConsistencyLevel::One);
        let max = cluster
            .prepare(&station_max_cql("weather"))
            .await
            .unwrap()
            .with_consistency(ConsistencyLevel::Three);
        (insert, max)
    }

    fn max_of(result: &QueryResult) -> Option<i32> {
        result.first_row().and_then(|r| r.get(0)).and_then(|v| v.as_int())
    }

    #[tokio::test]
    async fn test_prepare_rejects_unknown_statement() {
        let cluster = MemoryCluster::local("weather");
        let err = cluster.prepare("DROP TABLE weather.stations").await.unwrap_err();
        assert!(matches!(err, StorageFault::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_prepare_ignores_whitespace_and_case() {
        let cluster = MemoryCluster::local("weather");
        let stmt = cluster
            .prepare("select max(record.tmax)\n  from weather.stations where id = ?;")
            .await;
        assert!(stmt.is_ok());
    }

    #[tokio::test]
    async fn test_aggregate_row_is_null_without_data() {
        let cluster = MemoryCluster::local("weather");
        let (_, max) = prepared(&cluster).await;

        let result = cluster
            .execute(&max, &[CqlValue::Text("nowhere".into())])
            .await
            .unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(max_of(&result), None);
    }

    #[tokio::test]
    async fn test_write_one_succeeds_with_single_replica() {
        let cluster = MemoryCluster::local("weather");
        let (insert, max) = prepared(&cluster).await;
        cluster.set_node_up("db-2", false);
        cluster.set_node_up("db-3", false);

        assert!(cluster.execute(&insert, &reading("S1", 1, 0, 10)).await.is_ok());

        let err = cluster
            .execute(&max, &[CqlValue::Text("S1".into())])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StorageFault::Unavailable {
                consistency: ConsistencyLevel::Three,
                required: 3,
                alive: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_all_nodes_down_is_no_host_available() {
        let cluster = MemoryCluster::local("weather");
        let (insert, _) = prepared(&cluster).await;
        for (name, _) in cluster.node_status() {
            cluster.set_node_up(&name, false);
        }

        match cluster.execute(&insert, &reading("S1", 1, 0, 10)).await {
            Err(StorageFault::NoHostAvailable { errors }) => {
                assert_eq!(errors.len(), 3);
                assert_eq!(errors[0].host, "db-1");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stale_replica_does_not_win() {
        let cluster = MemoryCluster::local("weather");
        let (insert, max) = prepared(&cluster).await;

        cluster.execute(&insert, &reading("S1", 1, 0, 30)).await.unwrap();

        // db-3 misses the overwrite
        cluster.set_node_up("db-3", false);
        cluster.execute(&insert, &reading("S1", 1, 0, 12)).await.unwrap();
        cluster.set_node_up("db-3", true);

        let result = cluster
            .execute(&max, &[CqlValue::Text("S1".into())])
            .await
            .unwrap();
        assert_eq!(max_of(&result), Some(12));
    }

    #[tokio::test]
    async fn test_injected_fault_counts_as_execution() {
        let cluster = MemoryCluster::local("weather");
        let (insert, _) = prepared(&cluster).await;
        cluster.inject_fault(StorageFault::Other("boom".into()));

        let err = cluster.execute(&insert, &reading("S1", 1, 0, 1)).await.unwrap_err();
        assert_eq!(err, StorageFault::Other("boom".into()));
        assert_eq!(cluster.executions(), 1);

        assert!(cluster.execute(&insert, &reading("S1", 1, 0, 1)).await.is_ok());
        assert_eq!(cluster.executions(), 2);
    }

    #[tokio::test]
    async fn test_bad_values_rejected() {
        let cluster = MemoryCluster::local("weather");
        let (insert, _) = prepared(&cluster).await;
        let err = cluster
            .execute(&insert, &[CqlValue::Text("S1".into())])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageFault::InvalidQuery(_)));
    }

    #[test]
    fn test_late_older_write_does_not_replace_newer() {
        let mut rows = StationRows::new();
        let newer = Cell { tmin: 0, tmax: 8, written_at: 4 };
        let older = Cell { tmin: 0, tmax: 30, written_at: 3 };

        store_cell(&mut rows, "S1", date(1), newer);
        store_cell(&mut rows, "S1", date(1), older);
        assert_eq!(rows["S1"][&date(1)], newer);

        let newest = Cell { tmin: 1, tmax: 2, written_at: 5 };
        store_cell(&mut rows, "S1", date(1), newest);
        assert_eq!(rows["S1"][&date(1)], newest);
    }

    #[test]
    fn test_concurrent_writes_keep_newest_on_every_replica() {
        use std::sync::{Arc, Barrier};

        const WRITERS: usize = 4;

        for _ in 0..200 {
            let cluster = Arc::new(MemoryCluster::local("weather"));
            let barrier = Arc::new(Barrier::new(WRITERS));

            let handles: Vec<_> = (0..WRITERS)
                .map(|i| {
                    let cluster = cluster.clone();
                    let barrier = barrier.clone();
                    std::thread::spawn(move || {
                        let live = cluster.live_nodes();
                        barrier.wait();
                        cluster
                            .insert_reading(&live, &reading("S", 1, 0, i as i32))
                            .unwrap();
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            let newest = cluster.write_clock.load(Ordering::SeqCst);
            for node in &cluster.nodes {
                let rows = node.rows.lock().unwrap();
                assert_eq!(rows["S"][&date(1)].written_at, newest, "stale cell on {}", node.name);
            }
        }
    }

    #[test]
    fn test_set_unknown_node() {
        let cluster = MemoryCluster::local("weather");
        assert!(!cluster.set_node_up("db-9", false));
        assert_eq!(cluster.alive_nodes(), 3);
    }
}

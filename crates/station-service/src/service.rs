//! Station Operations

use crate::classifier::classify;
use chrono::NaiveDate;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storage::{StationStore, StorageFault};
use tracing::{debug, warn};

/// Record one day's range for a station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordTempsRequest {
    pub station: String,
    pub date: NaiveDate,
    pub tmin: i32,
    pub tmax: i32,
}

/// Empty `error` means the reading was stored
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordTempsReply {
    pub error: String,
}

/// Ask for the highest `tmax` of a station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationMaxRequest {
    pub station: String,
}

/// `tmax` is `None` both on failure and when the station has no readings;
/// only `error` tells the two apart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StationMaxReply {
    pub tmax: Option<i32>,
    pub error: String,
}

/// Station operations over a shared storage gateway
#[derive(Clone)]
pub struct StationService {
    store: Arc<StationStore>,
}

impl StationService {
    pub fn new(store: Arc<StationStore>) -> Self {
        Self { store }
    }

    /// Store a reading, overwriting any earlier one for the same date
    pub async fn record_temperatures(&self, request: RecordTempsRequest) -> RecordTempsReply {
        counter!("station_requests_total", "op" => "record_temps").increment(1);

        match self
            .store
            .record_reading(&request.station, request.date, request.tmin, request.tmax)
            .await
        {
            Ok(()) => RecordTempsReply::default(),
            Err(fault) => RecordTempsReply {
                error: failure("record_temps", &request.station, &fault),
            },
        }
    }

    /// Highest recorded `tmax` across every date of the station
    pub async fn station_maximum(&self, request: StationMaxRequest) -> StationMaxReply {
        counter!("station_requests_total", "op" => "station_max").increment(1);

        match self.store.station_maximum(&request.station).await {
            Ok(tmax) => {
                debug!("Station {} maximum: {:?}", request.station, tmax);
                StationMaxReply {
                    tmax,
                    error: String::new(),
                }
            }
            Err(fault) => StationMaxReply {
                tmax: None,
                error: failure("station_max", &request.station, &fault),
            },
        }
    }
}

fn failure(op: &'static str, station: &str, fault: &StorageFault) -> String {
    counter!("station_storage_faults_total", "op" => op, "kind" => fault.kind()).increment(1);
    let error = classify(fault);
    warn!("{} for station {} failed: {}", op, station, error);
    error
}

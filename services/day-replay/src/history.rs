//! History provider seam

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reconstruct::Sample;

/// One historical reading of a continuous sensor, before it is indexed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    pub entity_id: String,
    pub timestamp: DateTime<Utc>,
    pub value: String,
    #[serde(default)]
    pub attributes: serde_json::Value,
}

/// Source of per-entity history for a time window.
///
/// An entity without history in the window yields an empty sequence.
/// Errors are reported to the caller, which decides how to degrade.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait HistoryProvider: Send + Sync {
    /// State samples of an on/off entity
    async fn fetch_history(
        &self,
        entity_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> crate::Result<Vec<Sample>>;

    /// Readings of a sensor, with attributes
    async fn fetch_sensor_history(
        &self,
        entity_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> crate::Result<Vec<SensorSample>>;
}

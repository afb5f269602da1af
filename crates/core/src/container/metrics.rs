use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::container::descriptor::TypeKey;

/// Activation and usage statistics of one type
#[derive(Debug, Clone, Serialize)]
pub struct MetricRecord {
    #[serde(skip_serializing)]
    pub key: TypeKey,
    pub type_name: String,
    /// First activation; never updated afterwards
    pub activated: DateTime<Utc>,
    /// Type whose construction first required this one, or the type itself
    pub activation_owner: String,
    /// Time taken by the first resolution
    pub creation_time: Duration,
    pub dependency_count: usize,
    pub last_resolution: DateTime<Utc>,
    pub resolution_count: u64,
}

/// Read-mostly metrics store of one scope
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    records: Arc<RwLock<HashMap<TypeKey, MetricRecord>>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one resolution of `key`
    pub fn update(
        &self,
        key: TypeKey,
        owner: Option<TypeKey>,
        elapsed: Duration,
        dependency_count: usize,
    ) {
        let now = Utc::now();
        let mut records = self.records.write();
        let record = records.entry(key).or_insert_with(|| MetricRecord {
            key,
            type_name: key.short_name().to_string(),
            activated: now,
            activation_owner: owner.unwrap_or(key).short_name().to_string(),
            creation_time: elapsed,
            dependency_count,
            last_resolution: now,
            resolution_count: 0,
        });

        record.last_resolution = now;
        record.resolution_count += 1;
    }

    /// Snapshot of every record
    pub fn data(&self) -> Vec<MetricRecord> {
        self.records.read().values().cloned().collect()
    }

    pub fn metrics_for(&self, key: &TypeKey) -> Option<MetricRecord> {
        self.records.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn clear(&self) {
        self.records.write().clear();
    }
}

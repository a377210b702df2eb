use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::util::resolve_path;

/// Reserved snapshot key carrying the producer's last fatal error.
pub const ERROR_KEY: &str = "error";

// ════════════════════════════════════════════════════════════════
//  CarIndex
// ════════════════════════════════════════════════════════════════

/// Уникальный индекс машины в рамках сессии. Ключ store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CarIndex(pub u32);

impl CarIndex {
    /// Interpret a JSON value as a car index.
    ///
    /// Accepts an unsigned integer or a string holding one. Anything
    /// else (null, negative, fractional, text) yields `None`.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => {
                n.as_u64().and_then(|v| u32::try_from(v).ok()).map(CarIndex)
            }
            serde_json::Value::String(s) => s.trim().parse::<u32>().ok().map(CarIndex),
            _ => None,
        }
    }
}

impl From<u32> for CarIndex {
    fn from(v: u32) -> Self {
        CarIndex(v)
    }
}

impl std::fmt::Display for CarIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ════════════════════════════════════════════════════════════════
//  TelemetryPacket
// ════════════════════════════════════════════════════════════════

/// Один пакет телеметрии машины.
///
/// Store и endpoint работают с ним как с opaque JSON: внутренние поля
/// (speed, RPM, gear, ...) интерпретирует только downstream consumer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TelemetryPacket(serde_json::Value);

impl TelemetryPacket {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }

    /// Resolve the car this packet belongs to via a dot-separated field path.
    pub fn car_index(&self, key_field: &str) -> Option<CarIndex> {
        resolve_path(&self.0, key_field).and_then(CarIndex::from_value)
    }
}

impl From<serde_json::Value> for TelemetryPacket {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

// ════════════════════════════════════════════════════════════════
//  Snapshot
// ════════════════════════════════════════════════════════════════

/// Независимая копия содержимого store на один момент времени.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub cars: BTreeMap<CarIndex, TelemetryPacket>,
    pub error: Option<String>,
}

impl Snapshot {
    pub fn get(&self, car: CarIndex) -> Option<&TelemetryPacket> {
        self.cars.get(&car)
    }

    /// No cars and no error marker.
    pub fn is_empty(&self) -> bool {
        self.cars.is_empty() && self.error.is_none()
    }
}

impl Serialize for Snapshot {
    // Flat object: {"<car>": packet, ..., "error": "..."}
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let len = self.cars.len() + usize::from(self.error.is_some());
        let mut m = serializer.serialize_map(Some(len))?;
        for (car, packet) in &self.cars {
            m.serialize_entry(&car.to_string(), packet)?;
        }
        if let Some(ref error) = self.error {
            m.serialize_entry(ERROR_KEY, error)?;
        }
        m.end()
    }
}

// ════════════════════════════════════════════════════════════════
//  StoreStatus
// ════════════════════════════════════════════════════════════════

/// Producer health, read separately from the data map.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StoreStatus {
    /// Number of cars currently held.
    pub cars: usize,
    /// Total upserts applied since start.
    pub updates: u64,
    /// Wall-clock time of the last upsert (Unix ms).
    pub last_update_ms: Option<i64>,
    /// Recorded producer failure, if any.
    pub error: Option<String>,
}

//! Telemetry samples streamed by the device over serial

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Why a telemetry line was dropped
#[derive(Debug, thiserror::Error)]
pub enum TelemetryParseError {
    #[error("line is not a telemetry object: {0:?}")]
    NotAnObject(String),
    #[error("malformed telemetry: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One key/value sample, e.g. `{"photoresistor_adc": 812, "generator_freq": 12}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub fields: Map<String, Value>,
    pub received_at: DateTime<Utc>,
}

impl TelemetrySample {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            received_at: Utc::now(),
        }
    }

    /// Decode one line of the device log stream
    pub fn parse_line(line: &str) -> Result<Self, TelemetryParseError> {
        let line = line.trim();
        if !line.starts_with('{') {
            return Err(TelemetryParseError::NotAnObject(line.to_string()));
        }
        let fields: Map<String, Value> = serde_json::from_str(line)?;
        Ok(Self::new(fields))
    }

    /// Numeric field, if present
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }
}

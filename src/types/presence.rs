//! Presence lever definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Debounced or raw state of the device-under-test presence lever
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PresenceLevel {
    /// Device seated, lever pressed (pin reads 0)
    Present,
    /// No device (pin reads 1)
    Absent,
}

impl PresenceLevel {
    /// Decode the active-low expander pin
    pub fn from_pin(bit: u8) -> Self {
        if bit & 1 == 0 {
            PresenceLevel::Present
        } else {
            PresenceLevel::Absent
        }
    }

    /// Raw pin value for this level
    pub fn pin_value(&self) -> u8 {
        match self {
            PresenceLevel::Present => 0,
            PresenceLevel::Absent => 1,
        }
    }

    pub fn is_present(&self) -> bool {
        *self == PresenceLevel::Present
    }
}

impl std::fmt::Display for PresenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PresenceLevel::Present => "PRESENT",
            PresenceLevel::Absent => "ABSENT",
        };
        write!(f, "{}", name)
    }
}

/// One raw read of the lever
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PresenceSample {
    pub level: PresenceLevel,
    pub timestamp: DateTime<Utc>,
}

impl PresenceSample {
    pub fn now(level: PresenceLevel) -> Self {
        Self {
            level,
            timestamp: Utc::now(),
        }
    }
}

/// Result of one debounced poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceChange {
    Unchanged,
    /// A confirmed transition to the carried level
    Changed(PresenceLevel),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_low_decoding() {
        assert_eq!(PresenceLevel::from_pin(0), PresenceLevel::Present);
        assert_eq!(PresenceLevel::from_pin(1), PresenceLevel::Absent);
    }

    #[test]
    fn test_pin_value_round_trips() {
        for level in [PresenceLevel::Present, PresenceLevel::Absent] {
            assert_eq!(PresenceLevel::from_pin(level.pin_value()), level);
        }
    }
}

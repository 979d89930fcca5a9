//! RGB indicator colours

use serde::{Deserialize, Serialize};

/// Colours the operator indicator can show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndicatorColor {
    Off,
    Red,
    Green,
    Blue,
    Yellow,
    Purple,
    LightBlue,
    White,
}

impl IndicatorColor {
    /// (red, green, blue) channel on/off
    pub fn rgb(&self) -> (bool, bool, bool) {
        match self {
            IndicatorColor::Off => (false, false, false),
            IndicatorColor::Red => (true, false, false),
            IndicatorColor::Green => (false, true, false),
            IndicatorColor::Blue => (false, false, true),
            IndicatorColor::Yellow => (true, true, false),
            IndicatorColor::Purple => (true, false, true),
            IndicatorColor::LightBlue => (false, true, true),
            IndicatorColor::White => (true, true, true),
        }
    }

    /// GPIO line levels; the LED is common-anode so a lit channel is driven low
    pub fn line_levels(&self) -> [u8; 3] {
        let (r, g, b) = self.rgb();
        [!r as u8, !g as u8, !b as u8]
    }
}

impl std::fmt::Display for IndicatorColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IndicatorColor::Off => "OFF",
            IndicatorColor::Red => "RED",
            IndicatorColor::Green => "GREEN",
            IndicatorColor::Blue => "BLUE",
            IndicatorColor::Yellow => "YELLOW",
            IndicatorColor::Purple => "PURPLE",
            IndicatorColor::LightBlue => "LIGHT_BLUE",
            IndicatorColor::White => "WHITE",
        };
        write!(f, "{}", name)
    }
}

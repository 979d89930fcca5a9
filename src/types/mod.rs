//! Core types for the jig controller

mod color;
mod presence;
mod result;
mod stage;
mod status;
mod telemetry;

pub use color::IndicatorColor;
pub use presence::{PresenceChange, PresenceLevel, PresenceSample};
pub use result::{PipelineOutcome, RunResolution, RunResult};
pub use stage::StageError;
pub use status::{JigPhase, JigStatus};
pub use telemetry::{TelemetryParseError, TelemetrySample};

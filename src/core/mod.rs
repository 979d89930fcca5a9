//! Core modules for the jig controller

pub mod mailbox;
pub mod cancel;
pub mod stage;
pub mod pipeline;
pub mod supervisor;
pub mod debounce;
pub mod telemetry;
pub mod feedback;
pub mod controller;
pub mod api;

pub use mailbox::LatestValueMailbox;
pub use cancel::{CancellationQuery, CancellationToken};
pub use stage::Stage;
pub use pipeline::Pipeline;
pub use supervisor::{RunState, RunSupervisor};
pub use debounce::{DebounceConfig, DebouncedPresenceMonitor};
pub use telemetry::TelemetryReader;
pub use feedback::Feedback;
pub use controller::{ControllerTiming, JigController, JigLifecycle, NoopLifecycle};
pub use api::{create_router, run_server, ApiState};

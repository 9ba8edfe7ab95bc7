//! Pipeline assembly: lifecycle state, the intake loop, and the
//! controller that wires the stations together.

pub mod controller;
pub mod intake;
pub mod state;

pub use controller::{PipelineController, PipelineHandle, PipelineSettings, ShutdownTrigger};
pub use state::{PipelineState, SharedState};

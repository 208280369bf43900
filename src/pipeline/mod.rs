mod builder;
mod checkpoint;
mod logger;
mod resources;
mod runner;
pub mod steps;
mod workspace;

pub use builder::{Attempt, BuildMode, EngineBuilder};
pub use checkpoint::CheckpointStore;
pub use logger::{BuildLogger, LogSink};
pub use resources::{HostProbe, ResourceReport, SystemProbe};
pub use runner::StepRunner;
pub use steps::{Step, StepMode};
pub use workspace::Workspace;

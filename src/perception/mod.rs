pub mod backend;
pub mod engine;
pub mod fps;
pub mod replay;
pub mod scheduler;
pub mod state;

pub use backend::{FrameSource, InFlight, InFlightGuard, PerceptionBackend};
pub use engine::{Engine, EngineHandle, TickOutcome};
pub use fps::FpsEstimator;
pub use replay::{FrameCounter, ReplayBackend};
pub use scheduler::{Job, Scheduler};
pub use state::{PerceptionPartial, PerceptionState, Quality};

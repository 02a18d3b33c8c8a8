pub mod audio;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod monitor;
pub mod scheduler;
pub mod storage;
pub mod telemetry;
#[cfg(test)]
pub(crate) mod test_support;
pub mod wav;

pub use clock::{Clock, SystemClock, VirtualClock};
pub use engine::{EngineStats, MonitorEngine, MonitorEvent};
pub use error::EngineError;
pub use monitor::{start_monitor, MonitorJob};
pub use scheduler::{DutyCycleScheduler, SchedulerPhase};
pub use storage::{DirStorage, Storage};

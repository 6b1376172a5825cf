pub mod job;
pub mod progress;
pub mod runner;
pub mod scheduler;
pub mod session;

pub use job::{JobState, JobTable, RenderJob};
pub use progress::{LogProgress, NoProgress, Progress, ProgressReporter, SharedProgress};
pub use runner::{InProcessRunner, JobRunner, ProcessRunner};
pub use scheduler::{BatchReport, RenderScheduler, RenderSettings, TileSink};
pub use session::{initial_viewport, Session, TileIndex};

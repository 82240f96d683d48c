//! Asynchronous signal-parsing tasks: queue, worker loop and result cache.

pub mod cache;
pub mod model;
pub mod parser;
pub mod processor;

pub use cache::{ResultCache, TaskCounts};
pub use model::{Task, TaskResult, TaskStatus};
pub use parser::{ParseError, PassthroughParser, SignalParser};
pub use processor::{ABANDONED_ERROR, SHUTDOWN_ERROR, SubmitError, TaskProcessor, TaskStats};

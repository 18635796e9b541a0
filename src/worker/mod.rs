mod core;
mod status;
#[cfg(test)]
mod tests;

pub use self::core::{CaptureWorker, ErrorCallback};
pub use status::{SourceStatus, WorkerState};

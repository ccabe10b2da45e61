//! Process Adapter - Strategy Workers as Child Processes
//!
//! Implements the `WorkerLauncher` port with `tokio::process`. Each
//! worker is told its port and strategy id both on the command line and
//! through the environment.

pub mod launcher;

pub use launcher::{ChildWorker, ProcessLauncher};

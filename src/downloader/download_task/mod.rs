//! Download task execution -- supervision of one external downloader process.
//!
//! Split into focused submodules:
//! - [`context`] - Per-task state and registry bookkeeping
//! - [`process`] - Argument building, spawning, output readers, process-group signals
//! - [`orchestration`] - Top-level task lifecycle
//! - [`finalization`] - Exit classification and final status

mod context;
mod finalization;
mod orchestration;
mod process;


pub(crate) use context::TaskContext;
pub(crate) use orchestration::run_download_task;
pub(crate) use process::{TERMINATE, signal_group};

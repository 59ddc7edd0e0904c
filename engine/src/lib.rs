//! # fsxfer Engine - Cross-Filesystem Transfer Library
//!
//! A headless engine for copying or moving a directory tree onto a
//! filesystem with stricter naming rules than the one it came from.
//! Designed as the foundation for multiple front ends (CLI, automation).
//!
//! ## Overview
//!
//! The engine provides:
//! - A registry of filesystem profiles (FAT32, exFAT, NTFS, ext4, HFS+)
//! - Filename sanitization against the destination profile
//! - A discovery pass that counts files and bytes before anything is written
//! - A transfer pass that mirrors directories and copies or moves each file
//! - Per-file error isolation, collision detection and overwrite policies
//! - Progress reporting via a sink trait (decoupled from UI technology)
//!
//! ## Basic Usage
//!
//! ```no_run
//! use fsxfer_engine::{
//!     confirm_job, create_job, run_job, scan_job, CancelToken, JobConfig, Mode, RunState,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = JobConfig::new("/home/me/photos", "/media/card", "ext4", "FAT32", Mode::Copy);
//! let mut job = create_job(config)?;
//!
//! // Discovery pass
//! scan_job(&mut job)?;
//! if job.state == RunState::AbortedEmpty {
//!     return Ok(());
//! }
//! println!("Will copy {} files", job.tally().files_discovered);
//!
//! // Transfer pass
//! confirm_job(&mut job, true, None)?;
//! run_job(&mut job, None, &CancelToken::new())?;
//!
//! let summary = job.summary();
//! println!("{} transferred, {} failed", summary.files_transferred, summary.files_failed);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (JobConfig, TransferPlan, TransferJob, enums)
//! - **profile**: Filesystem profile registry
//! - **sanitize**: Filename sanitization
//! - **error**: Error types and handling
//! - **fs_ops**: Low-level filesystem operations (walk, mirror, copy, move)
//! - **job**: Job orchestration (create, scan, confirm, run)
//! - **progress**: Transfer sink trait and event types
//! - **cancel**: Cooperative cancellation token

pub mod cancel;
pub mod error;
pub mod fs_ops;
pub mod job;
pub mod model;
pub mod profile;
pub mod progress;
pub mod sanitize;

// Re-export main types and functions
pub use cancel::CancelToken;
pub use error::EngineError;
pub use job::{confirm_job, create_job, run_job, scan_job};
pub use model::{
    CollisionPolicy, FailureKind, FileOutcome, FileRecord, JobConfig, Mode, ModeOverride,
    OverwritePolicy, RunState, RunSummary, TransferJob, TransferPlan, TransferTally,
};
pub use profile::{profile_for, profiles, replaced_characters, FilesystemProfile};
pub use progress::{
    ChannelSink, ErrorNotice, ProgressUpdate, RenameNotice, TransferEvent, TransferSink,
};
pub use sanitize::{sanitize, sanitize_os, Sanitized, PLACEHOLDER};

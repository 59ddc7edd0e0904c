//! Core data model for transfer jobs.
//!
//! This module defines the main data structures for representing a transfer:
//! - JobConfig: what the caller asks for (paths, profile names, policies)
//! - TransferPlan: the validated, resolved form of a JobConfig
//! - TransferJob: the plan plus run state and the running tally
//! - FileRecord: a single file as it moves through the transfer pass
//! - Mode, FileOutcome, RunState and the policy enums controlling behavior

use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::profile::FilesystemProfile;

/// Caller-supplied description of a transfer, before validation.
///
/// Profile names are resolved through the registry by `create_job`; the
/// destination directory is created there if it does not exist yet.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub source_fs: String,
    pub destination_fs: String,
    pub mode: Mode,
    pub overwrite_policy: OverwritePolicy,
    pub collision_policy: CollisionPolicy,
}

impl JobConfig {
    /// Config with the default overwrite and collision policies.
    pub fn new(
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        source_fs: impl Into<String>,
        destination_fs: impl Into<String>,
        mode: Mode,
    ) -> Self {
        JobConfig {
            source: source.into(),
            destination: destination.into(),
            source_fs: source_fs.into(),
            destination_fs: destination_fs.into(),
            mode,
            overwrite_policy: OverwritePolicy::default(),
            collision_policy: CollisionPolicy::default(),
        }
    }
}

/// A validated transfer: absolute roots, resolved profiles, effective mode.
#[derive(Debug, Clone)]
pub struct TransferPlan {
    /// Absolute source root
    pub source_root: PathBuf,

    /// Absolute destination root (exists and is writable)
    pub destination_root: PathBuf,

    pub source_profile: &'static FilesystemProfile,
    pub destination_profile: &'static FilesystemProfile,

    /// Mode the caller asked for
    pub requested_mode: Mode,

    /// Mode that will actually run (may differ from `requested_mode`)
    pub mode: Mode,

    /// Set when `mode` was forced away from `requested_mode`
    pub mode_override: Option<ModeOverride>,

    pub overwrite_policy: OverwritePolicy,
    pub collision_policy: CollisionPolicy,
}

/// A transfer job: plan, lifecycle state and the running tally.
///
/// The tally is only ever mutated by the job functions in `crate::job`;
/// everyone else reads it by value through `tally()` or the emitted events.
#[derive(Debug)]
pub struct TransferJob {
    /// Unique identifier for this job
    pub id: Uuid,

    pub plan: TransferPlan,

    /// Current run state
    pub state: RunState,

    /// `Some(true)` once the caller confirmed, `Some(false)` if declined
    pub confirmed: Option<bool>,

    pub(crate) tally: TransferTally,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TransferJob {
    /// Snapshot of the running counters.
    pub fn tally(&self) -> TransferTally {
        self.tally
    }

    /// Summary of the job as it stands now.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            job_id: self.id,
            state: self.state,
            mode: self.plan.mode,
            total_files: self.tally.files_discovered,
            total_bytes: self.tally.bytes_discovered,
            files_transferred: self.tally.files_transferred,
            bytes_transferred: self.tally.bytes_transferred,
            files_failed: self.tally.files_failed,
            files_skipped: self.tally.files_skipped,
            files_renamed: self.tally.files_renamed,
            entries_unreadable: self.tally.entries_unreadable,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

/// Running counters for a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferTally {
    pub files_discovered: u64,
    pub bytes_discovered: u64,
    pub files_transferred: u64,
    pub bytes_transferred: u64,
    pub files_failed: u64,
    pub files_skipped: u64,
    pub files_renamed: u64,
    /// Directories or entries the transfer walk could not read
    pub entries_unreadable: u64,
}

/// Final report of a job, emitted once when it completes or is cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub job_id: Uuid,
    pub state: RunState,
    pub mode: Mode,
    pub total_files: u64,
    pub total_bytes: u64,
    pub files_transferred: u64,
    pub bytes_transferred: u64,
    pub files_failed: u64,
    pub files_skipped: u64,
    pub files_renamed: u64,
    pub entries_unreadable: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Record of a forced mode change, e.g. Move downgraded to Copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModeOverride {
    pub requested: Mode,
    pub effective: Mode,
    pub reason: String,
}

/// A single file within the transfer pass.
///
/// Records are built one at a time from the walk and dropped once their
/// outcome has been reported; they are never collected.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: Uuid,

    /// Directory containing the file, relative to the source root
    pub relative_dir: PathBuf,

    /// Filename as found on the source
    pub original_name: OsString,

    /// Filename legal on the destination profile
    pub sanitized_name: String,

    /// Full source path
    pub source_path: PathBuf,

    /// Full destination path (empty until resolved)
    pub destination_path: PathBuf,

    /// Size in bytes; 0 if the file could not be stat'd
    pub size: u64,

    pub outcome: FileOutcome,
}

/// The operation mode for a transfer job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Mode {
    /// Copy files; source remains unchanged
    Copy,
    /// Move files; source removed once the destination is in place
    Move,
}

impl Mode {
    /// Parse a mode name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "copy" => Some(Mode::Copy),
            "move" => Some(Mode::Move),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Copy => write!(f, "Copy"),
            Mode::Move => write!(f, "Move"),
        }
    }
}

/// Outcome of a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Not yet processed
    Pending,
    /// Copied or moved into place
    Transferred,
    /// Left alone because of the overwrite policy
    Skipped,
    /// Not transferred
    Failed { kind: FailureKind, reason: String },
}

impl FileOutcome {
    /// Returns true if this outcome is terminal (no further changes expected).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FileOutcome::Pending)
    }
}

/// Why a file (or walk entry) was not transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The copy or move primitive failed
    Transfer,
    /// Another source file already claimed the same sanitized destination
    Collision,
    /// The mirrored destination directory could not be created
    DirectoryUnavailable,
    /// The walk could not read this entry
    Unreadable,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Transfer => write!(f, "transfer failed"),
            FailureKind::Collision => write!(f, "name collision"),
            FailureKind::DirectoryUnavailable => write!(f, "destination directory unavailable"),
            FailureKind::Unreadable => write!(f, "unreadable"),
        }
    }
}

/// The state of an entire transfer job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Created, source not yet scanned
    NotStarted,
    /// Discovery pass in progress
    Scanning,
    /// Discovery found no files; nothing will be transferred
    AbortedEmpty,
    /// Discovery done; waiting for the caller to confirm
    AwaitingConfirmation,
    /// Transfer pass in progress
    Transferring,
    /// Every file was processed (some may have failed)
    Completed,
    /// Declined before the transfer, or interrupted during it
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::AbortedEmpty | RunState::Completed | RunState::Cancelled
        )
    }
}

/// Policy for files that already exist at the destination before the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum OverwritePolicy {
    /// Always overwrite existing files
    #[default]
    Overwrite,
    /// Don't overwrite; skip existing files
    Skip,
    /// Overwrite if source is newer OR size differs
    SmartUpdate,
}

impl OverwritePolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "overwrite" => Some(OverwritePolicy::Overwrite),
            "skip" => Some(OverwritePolicy::Skip),
            "smart" | "smart-update" => Some(OverwritePolicy::SmartUpdate),
            _ => None,
        }
    }
}

impl fmt::Display for OverwritePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverwritePolicy::Overwrite => write!(f, "Overwrite"),
            OverwritePolicy::Skip => write!(f, "Skip"),
            OverwritePolicy::SmartUpdate => write!(f, "SmartUpdate"),
        }
    }
}

/// Policy for two source files that sanitize to the same destination name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum CollisionPolicy {
    /// Fail the later file; the first one keeps the name
    #[default]
    Refuse,
    /// Give the later file a " (n)" suffix before its extension
    Suffix,
}

impl CollisionPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "refuse" | "fail" => Some(CollisionPolicy::Refuse),
            "suffix" | "rename" => Some(CollisionPolicy::Suffix),
            _ => None,
        }
    }
}

impl fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollisionPolicy::Refuse => write!(f, "Refuse"),
            CollisionPolicy::Suffix => write!(f, "Suffix"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse_is_case_insensitive() {
        assert_eq!(Mode::parse("COPY"), Some(Mode::Copy));
        assert_eq!(Mode::parse(" move "), Some(Mode::Move));
        assert_eq!(Mode::parse("sync"), None);
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(OverwritePolicy::parse("smart"), Some(OverwritePolicy::SmartUpdate));
        assert_eq!(OverwritePolicy::parse("ask"), None);
        assert_eq!(CollisionPolicy::parse("suffix"), Some(CollisionPolicy::Suffix));
        assert_eq!(CollisionPolicy::default(), CollisionPolicy::Refuse);
    }

    #[test]
    fn test_terminal_states() {
        assert!(RunState::AbortedEmpty.is_terminal());
        assert!(RunState::Cancelled.is_terminal());
        assert!(!RunState::AwaitingConfirmation.is_terminal());
        assert!(!FileOutcome::Pending.is_terminal());
        assert!(FileOutcome::Skipped.is_terminal());
    }
}

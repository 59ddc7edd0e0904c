//! Job orchestration module.
//!
//! This module provides the job lifecycle functions:
//! - `create_job`: validate a JobConfig into a TransferPlan
//! - `scan_job`: discovery pass (counts files and bytes)
//! - `confirm_job`: record the caller's go/no-go decision
//! - `run_job`: transfer pass (mirror, sanitize, copy or move, report)
//!
//! Run states move `NotStarted -> Scanning -> (AbortedEmpty |
//! AwaitingConfirmation) -> Transferring -> Completed`, with `Cancelled`
//! reachable from `AwaitingConfirmation` (declined) and `Transferring`
//! (cancel token set).

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::error::EngineError;
use crate::fs_ops::{self, Mirror, WalkEntry};
use crate::model::{
    CollisionPolicy, FailureKind, FileOutcome, FileRecord, JobConfig, Mode, ModeOverride,
    OverwritePolicy, RunState, TransferJob, TransferPlan, TransferTally,
};
use crate::profile;
use crate::progress::{ErrorNotice, ProgressUpdate, RenameNotice, TransferSink};
use crate::sanitize::sanitize_os;

/// Create a new transfer job.
///
/// Resolves both profile names, validates the source root, creates the
/// destination root if needed and checks that it is writable. A requested
/// Move on a source that cannot be written to is downgraded to Copy; the
/// override is kept on the plan and reported when the transfer starts.
///
/// # Errors
/// Returns a configuration EngineError; nothing has been transferred.
pub fn create_job(config: JobConfig) -> Result<TransferJob, EngineError> {
    let source_profile = profile::profile_for(&config.source_fs)?;
    let destination_profile = profile::profile_for(&config.destination_fs)?;

    let source_root = validate_source(&config.source)?;
    let destination_root = prepare_destination(&source_root, &config.destination)?;

    let (mode, mode_override) = effective_mode(config.mode, &source_root);

    let plan = TransferPlan {
        source_root,
        destination_root,
        source_profile,
        destination_profile,
        requested_mode: config.mode,
        mode,
        mode_override,
        overwrite_policy: config.overwrite_policy,
        collision_policy: config.collision_policy,
    };

    let job = TransferJob {
        id: Uuid::new_v4(),
        plan,
        state: RunState::NotStarted,
        confirmed: None,
        tally: TransferTally::default(),
        created_at: Utc::now(),
        started_at: None,
        finished_at: None,
    };
    info!(
        job = %job.id,
        source = %job.plan.source_root.display(),
        destination = %job.plan.destination_root.display(),
        from = %source_profile,
        to = %destination_profile,
        mode = %job.plan.mode,
        "created transfer job"
    );
    Ok(job)
}

fn validate_source(source: &Path) -> Result<PathBuf, EngineError> {
    let access_denied = |e: io::Error| EngineError::SourceAccessDenied {
        path: source.to_path_buf(),
        source: e,
    };

    match fs::metadata(source) {
        Ok(metadata) if metadata.is_dir() => fs::canonicalize(source).map_err(access_denied),
        Ok(_) => Err(EngineError::NotADirectory {
            path: source.to_path_buf(),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(EngineError::SourceNotFound {
            path: source.to_path_buf(),
        }),
        Err(e) => Err(access_denied(e)),
    }
}

fn prepare_destination(source_root: &Path, destination: &Path) -> Result<PathBuf, EngineError> {
    let not_writable = |e: io::Error| EngineError::DestinationNotWritable {
        path: destination.to_path_buf(),
        source: e,
    };

    // Checked before creating anything, then again once symlinks can be resolved
    let absolute = std::path::absolute(destination).map_err(not_writable)?;
    ensure_outside_source(source_root, &absolute)?;

    match fs::metadata(&absolute) {
        Ok(metadata) if !metadata.is_dir() => {
            return Err(EngineError::NotADirectory { path: absolute });
        }
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(&absolute).map_err(|e| EngineError::DestinationCreationFailed {
                path: absolute.clone(),
                source: e,
            })?;
            info!(path = %absolute.display(), "created destination directory");
        }
        Err(e) => return Err(not_writable(e)),
    }

    let destination_root = fs::canonicalize(&absolute).map_err(not_writable)?;
    ensure_outside_source(source_root, &destination_root)?;
    fs_ops::check_writable(&destination_root).map_err(not_writable)?;
    Ok(destination_root)
}

fn ensure_outside_source(source_root: &Path, destination: &Path) -> Result<(), EngineError> {
    if destination.starts_with(source_root) {
        return Err(EngineError::DestinationInsideSource {
            source_root: source_root.to_path_buf(),
            destination: destination.to_path_buf(),
        });
    }
    Ok(())
}

/// Mode that will actually run for `requested` on `source_root`.
fn effective_mode(requested: Mode, source_root: &Path) -> (Mode, Option<ModeOverride>) {
    if requested != Mode::Move {
        return (requested, None);
    }
    match fs_ops::check_writable(source_root) {
        Ok(()) => (Mode::Move, None),
        Err(e) => {
            let notice = downgrade_to_copy(source_root, &e);
            warn!(source = %source_root.display(), error = %e, "{}", notice.reason);
            (Mode::Copy, Some(notice))
        }
    }
}

fn downgrade_to_copy(source_root: &Path, error: &io::Error) -> ModeOverride {
    ModeOverride {
        requested: Mode::Move,
        effective: Mode::Copy,
        reason: format!(
            "Source {} is not writable ({}); cannot move, copying instead",
            source_root.display(),
            error
        ),
    }
}

fn expect_state(job: &TransferJob, expected: RunState) -> Result<(), EngineError> {
    if job.state != expected {
        return Err(EngineError::InvalidState {
            expected,
            actual: job.state,
        });
    }
    Ok(())
}

/// Discovery pass: count files and bytes under the source root.
///
/// Files that cannot be stat'd are still counted, with 0 bytes. Leaves the
/// job in `AbortedEmpty` when nothing was found, otherwise in
/// `AwaitingConfirmation`. An aborted job is finished; its `summary()` is
/// the final one.
///
/// # Errors
/// Returns EngineError if the job is not in `NotStarted` state.
pub fn scan_job(job: &mut TransferJob) -> Result<(), EngineError> {
    expect_state(job, RunState::NotStarted)?;
    job.state = RunState::Scanning;

    let replaced =
        profile::replaced_characters(job.plan.source_profile, job.plan.destination_profile);
    if !replaced.is_empty() {
        info!(
            from = %job.plan.source_profile,
            to = %job.plan.destination_profile,
            characters = ?replaced,
            "names using these characters will be renamed"
        );
    }

    let mut tally = TransferTally::default();
    for entry in fs_ops::walk(&job.plan.source_root) {
        match entry {
            WalkEntry::File {
                relative_dir,
                name,
                size,
            } => {
                tally.files_discovered += 1;
                match size {
                    Some(size) => tally.bytes_discovered += size,
                    None => warn!(
                        path = %relative_dir.join(&name).display(),
                        "could not stat file during discovery; counting 0 bytes"
                    ),
                }
            }
            WalkEntry::Unreadable { path, reason } => {
                warn!(path = %path.display(), %reason, "could not read entry during discovery");
            }
            WalkEntry::Directory { .. } => {}
        }
    }

    job.tally = tally;
    job.state = if tally.files_discovered == 0 {
        info!(source = %job.plan.source_root.display(), "no files found; nothing to transfer");
        job.finished_at = Some(Utc::now());
        RunState::AbortedEmpty
    } else {
        info!(
            files = tally.files_discovered,
            bytes = tally.bytes_discovered,
            "discovery complete"
        );
        RunState::AwaitingConfirmation
    };
    Ok(())
}

/// Record whether the caller wants the transfer to go ahead.
///
/// Declining cancels the job and emits its summary.
///
/// # Errors
/// Returns EngineError if the job is not awaiting confirmation.
pub fn confirm_job(
    job: &mut TransferJob,
    accepted: bool,
    sink: Option<&dyn TransferSink>,
) -> Result<(), EngineError> {
    expect_state(job, RunState::AwaitingConfirmation)?;
    job.confirmed = Some(accepted);

    if !accepted {
        info!(job = %job.id, "transfer declined");
        job.state = RunState::Cancelled;
        job.finished_at = Some(Utc::now());
        if let Some(sink) = sink {
            sink.on_summary(&job.summary());
        }
    }
    Ok(())
}

/// Run a job, executing the transfer pass.
///
/// Walks the source tree again, mirroring directories and transferring
/// each file as it is found. Individual file failures are reported through
/// the sink and counted, but never stop the job. The cancel token is
/// checked before every entry; once set, the job stops and ends in
/// `Cancelled`. Exactly one summary is emitted at the end.
///
/// # Errors
/// Returns EngineError only if the job is not confirmed and awaiting transfer.
pub fn run_job(
    job: &mut TransferJob,
    sink: Option<&dyn TransferSink>,
    cancel: &CancelToken,
) -> Result<(), EngineError> {
    expect_state(job, RunState::AwaitingConfirmation)?;
    if job.confirmed != Some(true) {
        return Err(EngineError::NotConfirmed);
    }

    job.state = RunState::Transferring;
    job.started_at = Some(Utc::now());
    info!(job = %job.id, mode = %job.plan.mode, "transfer started");

    if let (Some(notice), Some(sink)) = (&job.plan.mode_override, sink) {
        sink.on_mode_override(notice);
    }

    let mut executor = Executor::new(&job.plan);
    for entry in fs_ops::walk(&job.plan.source_root) {
        if cancel.is_cancelled() {
            info!(job = %job.id, "transfer cancelled");
            job.state = RunState::Cancelled;
            break;
        }

        match entry {
            WalkEntry::Directory { relative } => {
                executor.mirror_directory(&relative, sink);
            }
            WalkEntry::File {
                relative_dir,
                name,
                size,
            } => {
                let record = executor.transfer_file(relative_dir, name, size, &mut job.tally, sink);
                debug!(
                    id = %record.id,
                    source = %record.source_path.display(),
                    destination = %record.destination_path.display(),
                    outcome = ?record.outcome,
                    "file processed"
                );
            }
            WalkEntry::Unreadable { path, reason } => {
                job.tally.entries_unreadable += 1;
                warn!(path = %path.display(), %reason, "could not read entry");
                if let Some(sink) = sink {
                    sink.on_error(&ErrorNotice {
                        path,
                        kind: FailureKind::Unreadable,
                        reason,
                    });
                }
            }
        }
    }

    if job.state == RunState::Transferring {
        job.state = RunState::Completed;
    }
    job.finished_at = Some(Utc::now());

    let summary = job.summary();
    info!(
        job = %job.id,
        state = ?summary.state,
        transferred = summary.files_transferred,
        failed = summary.files_failed,
        skipped = summary.files_skipped,
        bytes = summary.bytes_transferred,
        "transfer finished"
    );
    if let Some(sink) = sink {
        sink.on_summary(&summary);
    }
    Ok(())
}

/// Per-run state of the transfer pass.
struct Executor<'a> {
    plan: &'a TransferPlan,
    mirror: Mirror,
    /// Destination paths written in this run, keyed per `claim_key`, with
    /// the source file that owns each
    claims: HashMap<String, PathBuf>,
}

impl<'a> Executor<'a> {
    fn new(plan: &'a TransferPlan) -> Self {
        Executor {
            plan,
            mirror: Mirror::new(&plan.destination_root, plan.destination_profile),
            claims: HashMap::new(),
        }
    }

    fn mirror_directory(&mut self, relative: &Path, sink: Option<&dyn TransferSink>) {
        match self.mirror.ensure(relative) {
            Ok(dir) => {
                if let (Some((original, sanitized)), Some(sink)) = (dir.renamed, sink) {
                    sink.on_rename(&RenameNotice {
                        relative_dir: relative.parent().map(Path::to_path_buf).unwrap_or_default(),
                        original,
                        sanitized: sanitized.name,
                        is_dir: true,
                    });
                }
            }
            Err(reason) => {
                // Files below report their own failures
                debug!(dir = %relative.display(), %reason, "directory not mirrored");
            }
        }
    }

    fn transfer_file(
        &mut self,
        relative_dir: PathBuf,
        name: OsString,
        size: Option<u64>,
        tally: &mut TransferTally,
        sink: Option<&dyn TransferSink>,
    ) -> FileRecord {
        let sanitized = sanitize_os(&name, self.plan.destination_profile);
        let mut record = FileRecord {
            id: Uuid::new_v4(),
            source_path: self.plan.source_root.join(&relative_dir).join(&name),
            relative_dir,
            original_name: name,
            sanitized_name: sanitized.name,
            destination_path: PathBuf::new(),
            size: size.unwrap_or(0),
            outcome: FileOutcome::Pending,
        };

        record.outcome = self.execute(&mut record, tally, sink);

        match &record.outcome {
            FileOutcome::Transferred => {
                tally.files_transferred += 1;
                tally.bytes_transferred += record.size;
                if let Some(sink) = sink {
                    sink.on_progress(&ProgressUpdate {
                        files_transferred: tally.files_transferred,
                        total_files: tally.files_discovered,
                        bytes_transferred: tally.bytes_transferred,
                        total_bytes: tally.bytes_discovered,
                        file_bytes: record.size,
                        destination: record.destination_path.clone(),
                    });
                }
            }
            FileOutcome::Skipped => {
                tally.files_skipped += 1;
            }
            FileOutcome::Failed { kind, reason } => {
                tally.files_failed += 1;
                warn!(path = %record.source_path.display(), %kind, %reason, "file not transferred");
                if let Some(sink) = sink {
                    sink.on_error(&ErrorNotice {
                        path: record.source_path.clone(),
                        kind: *kind,
                        reason: reason.clone(),
                    });
                }
            }
            FileOutcome::Pending => {}
        }
        record
    }

    fn execute(
        &mut self,
        record: &mut FileRecord,
        tally: &mut TransferTally,
        sink: Option<&dyn TransferSink>,
    ) -> FileOutcome {
        let dest_dir = match self.mirror.resolve(&record.relative_dir) {
            Ok(dir) => dir,
            Err(reason) => {
                return FileOutcome::Failed {
                    kind: FailureKind::DirectoryUnavailable,
                    reason,
                }
            }
        };

        let claim = self.claim(&dest_dir, &record.sanitized_name, &record.source_path);

        let original = record.original_name.to_string_lossy();
        let final_name = match &claim {
            Ok((_, name)) => name.as_str(),
            Err(_) => record.sanitized_name.as_str(),
        };
        if final_name != original || record.original_name.to_str().is_none() {
            tally.files_renamed += 1;
            debug!(from = %original, to = %final_name, "renaming for destination");
            if let Some(sink) = sink {
                sink.on_rename(&RenameNotice {
                    relative_dir: record.relative_dir.clone(),
                    original: original.into_owned(),
                    sanitized: final_name.to_string(),
                    is_dir: false,
                });
            }
        }

        let destination = match claim {
            Ok((path, _)) => path,
            Err(reason) => {
                return FileOutcome::Failed {
                    kind: FailureKind::Collision,
                    reason,
                }
            }
        };
        record.destination_path = destination.clone();

        if !should_transfer(&record.source_path, &destination, self.plan.overwrite_policy) {
            debug!(path = %destination.display(), "destination exists; skipping");
            return FileOutcome::Skipped;
        }

        let result = match self.plan.mode {
            Mode::Copy => fs_ops::copy_file_with_metadata(&record.source_path, &destination),
            Mode::Move => fs_ops::move_file(&record.source_path, &destination),
        };
        match result {
            Ok(_) => FileOutcome::Transferred,
            Err(e) => FileOutcome::Failed {
                kind: FailureKind::Transfer,
                reason: e.to_string(),
            },
        }
    }

    /// Reserve a destination name in `dir` for `source`.
    ///
    /// Returns the destination path and the final filename, or the
    /// collision reason when the collision policy refuses.
    fn claim(
        &mut self,
        dir: &Path,
        name: &str,
        source: &Path,
    ) -> Result<(PathBuf, String), String> {
        let candidate = dir.join(name);
        let key = self.claim_key(&candidate);
        let owner = self.claims.get(&key).cloned();

        match owner {
            None => {
                self.claims.insert(key, source.to_path_buf());
                Ok((candidate, name.to_string()))
            }
            Some(owner) if owner == source => Ok((candidate, name.to_string())),
            Some(owner) => match self.plan.collision_policy {
                CollisionPolicy::Refuse => Err(format!(
                    "{} was already written from {}",
                    candidate.display(),
                    owner.display()
                )),
                CollisionPolicy::Suffix => {
                    let mut n = 1u32;
                    loop {
                        let alternative = suffixed_name(name, n);
                        let path = dir.join(&alternative);
                        let key = self.claim_key(&path);
                        if !self.claims.contains_key(&key) {
                            self.claims.insert(key, source.to_path_buf());
                            return Ok((path, alternative));
                        }
                        n += 1;
                    }
                }
            },
        }
    }

    /// Key under which a destination path is claimed.
    ///
    /// Case-insensitive destinations fold case, so `A.txt` and `a.txt`
    /// compete for the same entry.
    fn claim_key(&self, path: &Path) -> String {
        let path = path.to_string_lossy();
        if self.plan.destination_profile.is_case_sensitive() {
            path.into_owned()
        } else {
            path.to_lowercase()
        }
    }
}

/// `name` with " (n)" inserted before its extension.
fn suffixed_name(name: &str, n: u32) -> String {
    let path = Path::new(name);
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => format!(
            "{} ({}).{}",
            stem.to_string_lossy(),
            n,
            ext.to_string_lossy()
        ),
        _ => format!("{} ({})", name, n),
    }
}

/// Decide whether to write over a destination that existed before this run.
fn should_transfer(source: &Path, destination: &Path, policy: OverwritePolicy) -> bool {
    let dst_metadata = match fs::symlink_metadata(destination) {
        Ok(metadata) => metadata,
        Err(_) => return true,
    };

    match policy {
        OverwritePolicy::Overwrite => true,
        OverwritePolicy::Skip => false,
        OverwritePolicy::SmartUpdate => match fs::metadata(source) {
            Ok(src_metadata) => {
                let newer = match (src_metadata.modified(), dst_metadata.modified()) {
                    (Ok(src), Ok(dst)) => src > dst,
                    _ => false,
                };
                src_metadata.len() != dst_metadata.len() || newer
            }
            // Let the transfer itself report the problem
            Err(_) => true,
        },
    }
}

//! Progress reporting.
//!
//! This module defines the TransferSink trait, which decouples the transfer
//! engine from any presentation (terminal, log file, another thread). The
//! engine never formats user-facing output; it hands structured events to
//! the sink in the order files are processed.

use std::path::PathBuf;

use crossbeam_channel::Sender;
use serde::Serialize;

use crate::model::{FailureKind, ModeOverride, RunSummary};

/// A file or directory received a different name at the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenameNotice {
    /// Directory holding the entry, relative to the source root
    pub relative_dir: PathBuf,
    pub original: String,
    pub sanitized: String,
    pub is_dir: bool,
}

/// Emitted once per successfully transferred file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    pub files_transferred: u64,
    pub total_files: u64,
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    /// Size of the file just transferred
    pub file_bytes: u64,
    pub destination: PathBuf,
}

/// Emitted once per failed file; the run continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorNotice {
    pub path: PathBuf,
    pub kind: FailureKind,
    pub reason: String,
}

/// Trait for receiving events from a transfer job.
///
/// All methods are called synchronously on the thread running the job.
pub trait TransferSink: Send {
    /// Called when the transfer starts with a mode other than the requested one.
    fn on_mode_override(&self, _notice: &ModeOverride) {}

    fn on_rename(&self, notice: &RenameNotice);

    fn on_progress(&self, update: &ProgressUpdate);

    fn on_error(&self, notice: &ErrorNotice);

    /// Called exactly once, when the job completes or is cancelled.
    fn on_summary(&self, summary: &RunSummary);
}

/// Owned form of every sink callback, for message passing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TransferEvent {
    ModeOverride(ModeOverride),
    Rename(RenameNotice),
    Progress(ProgressUpdate),
    Error(ErrorNotice),
    Summary(RunSummary),
}

/// A TransferSink that forwards every event over a channel.
///
/// Sending never blocks the job on an unbounded channel; a dropped receiver
/// is ignored.
pub struct ChannelSink {
    sender: Sender<TransferEvent>,
}

impl ChannelSink {
    pub fn new(sender: Sender<TransferEvent>) -> Self {
        ChannelSink { sender }
    }
}

impl TransferSink for ChannelSink {
    fn on_mode_override(&self, notice: &ModeOverride) {
        let _ = self.sender.send(TransferEvent::ModeOverride(notice.clone()));
    }

    fn on_rename(&self, notice: &RenameNotice) {
        let _ = self.sender.send(TransferEvent::Rename(notice.clone()));
    }

    fn on_progress(&self, update: &ProgressUpdate) {
        let _ = self.sender.send(TransferEvent::Progress(update.clone()));
    }

    fn on_error(&self, notice: &ErrorNotice) {
        let _ = self.sender.send(TransferEvent::Error(notice.clone()));
    }

    fn on_summary(&self, summary: &RunSummary) {
        let _ = self.sender.send(TransferEvent::Summary(summary.clone()));
    }
}

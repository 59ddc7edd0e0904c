//! fsxfer - Command-line interface for the transfer engine.
//!
//! Copies or moves a directory tree onto a filesystem with stricter naming
//! rules, renaming what the destination cannot store. Progress and renames
//! are reported on stderr; `--json` prints the final summary on stdout.

use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

use fsxfer_engine::{
    confirm_job, create_job, profiles, replaced_characters, run_job, scan_job, CancelToken,
    CollisionPolicy, ErrorNotice, FilesystemProfile, JobConfig, Mode, ModeOverride,
    OverwritePolicy, ProgressUpdate, RenameNotice, RunState, RunSummary, TransferJob,
    TransferSink,
};

/// fsxfer - Transfer files between filesystems with different naming rules
#[derive(Parser, Debug)]
#[command(name = "fsxfer")]
#[command(version = "0.1.0")]
#[command(about = "Copy or move a directory tree, renaming files the destination cannot store")]
struct Args {
    /// Source directory
    #[arg(long, value_name = "PATH", required_unless_present = "list_profiles")]
    src: Option<PathBuf>,

    /// Destination directory (created if missing)
    #[arg(long, value_name = "PATH", required_unless_present = "list_profiles")]
    dst: Option<PathBuf>,

    /// Filesystem of the source, e.g. ext4
    #[arg(long, value_name = "PROFILE", required_unless_present = "list_profiles")]
    src_fs: Option<String>,

    /// Filesystem of the destination, e.g. FAT32
    #[arg(long, value_name = "PROFILE", required_unless_present = "list_profiles")]
    dst_fs: Option<String>,

    /// Operation mode: copy or move
    #[arg(long, value_name = "MODE", default_value = "copy")]
    mode: String,

    /// Existing destination files: overwrite, skip, or smart
    #[arg(long, value_name = "POLICY", default_value = "overwrite")]
    overwrite: String,

    /// Two files mapping to one name: refuse or suffix
    #[arg(long, value_name = "POLICY", default_value = "refuse")]
    on_collision: String,

    /// Start the transfer without asking for confirmation
    #[arg(short, long)]
    yes: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Print the final summary as JSON on stdout
    #[arg(long)]
    json: bool,

    /// List the known filesystem profiles and exit
    #[arg(long)]
    list_profiles: bool,
}

/// How a CLI run ended, short of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// Every file was transferred or skipped
    Completed,
    /// The source held no files
    NothingToDo,
    /// The user answered no at the prompt
    Declined,
    /// Ctrl-C arrived during the transfer
    Interrupted,
    /// `--list-profiles` was printed
    Listed,
}

impl Outcome {
    fn exit_code(self) -> i32 {
        match self {
            Outcome::Interrupted => 1,
            _ => 0,
        }
    }
}

/// CLI implementation of TransferSink for displaying transfer progress
struct CliReport {
    verbose: bool,
    json: bool,
    start_time: Instant,
    last_progress_update: Mutex<Option<Instant>>,
    failures: Mutex<Vec<ErrorNotice>>,
}

impl CliReport {
    fn new(verbose: bool, json: bool) -> Self {
        CliReport {
            verbose,
            json,
            start_time: Instant::now(),
            last_progress_update: Mutex::new(None),
            failures: Mutex::new(Vec::new()),
        }
    }

    fn failure_count(&self) -> usize {
        self.failures.lock().map(|f| f.len()).unwrap_or(0)
    }

    fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    fn format_duration(elapsed: std::time::Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }

    fn print_progress_bar(percent: u32) -> String {
        let filled = (percent.min(100) / 5) as usize;
        let empty = 20 - filled;
        format!("[{}{}] {}%", "=".repeat(filled), " ".repeat(empty), percent)
    }

    fn elapsed(&self, summary: &RunSummary) -> std::time::Duration {
        match (summary.started_at, summary.finished_at) {
            (Some(start), Some(end)) => (end - start).to_std().unwrap_or_default(),
            _ => self.start_time.elapsed(),
        }
    }
}

impl TransferSink for CliReport {
    fn on_mode_override(&self, notice: &ModeOverride) {
        eprintln!("Warning: {}", notice.reason);
    }

    fn on_rename(&self, notice: &RenameNotice) {
        let kind = if notice.is_dir { "dir " } else { "" };
        eprintln!(
            "\rRenamed {}{} -> {}",
            kind,
            notice.relative_dir.join(&notice.original).display(),
            notice.sanitized
        );
    }

    fn on_progress(&self, update: &ProgressUpdate) {
        if self.verbose {
            eprintln!(
                "[{}/{}] {} ({})",
                update.files_transferred,
                update.total_files,
                update.destination.display(),
                Self::format_bytes(update.file_bytes)
            );
            return;
        }

        // Throttle progress updates to avoid spam (max once per 200ms)
        let Ok(mut last) = self.last_progress_update.lock() else {
            return;
        };
        let done = update.files_transferred == update.total_files;
        if let Some(at) = *last {
            if at.elapsed().as_millis() < 200 && !done {
                return;
            }
        }
        *last = Some(Instant::now());

        let total_bytes = update.total_bytes.max(1);
        let percent = (update.bytes_transferred as f64 / total_bytes as f64 * 100.0) as u32;
        eprint!(
            "\rProgress: {} | {}/{} files | {}/{}",
            Self::print_progress_bar(percent),
            update.files_transferred,
            update.total_files,
            Self::format_bytes(update.bytes_transferred),
            Self::format_bytes(update.total_bytes)
        );
        let _ = io::stderr().flush();
    }

    fn on_error(&self, notice: &ErrorNotice) {
        if self.verbose {
            eprintln!("\rFailed: {}: {}", notice.path.display(), notice.reason);
        }
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(notice.clone());
        }
    }

    fn on_summary(&self, summary: &RunSummary) {
        if self.json {
            match serde_json::to_string_pretty(summary) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("Error: could not encode summary: {}", e),
            }
        }

        // run_cli already said there was nothing to do
        if summary.state == RunState::AbortedEmpty {
            return;
        }

        eprintln!();
        match summary.state {
            RunState::Cancelled if summary.started_at.is_none() => {
                eprintln!("Transfer declined; nothing was written.");
                return;
            }
            RunState::Cancelled => eprintln!("Transfer interrupted!"),
            _ => eprintln!("Transfer complete!"),
        }

        eprintln!(
            "Summary: {} transferred, {} skipped, {} failed, {} renamed (of {} files)",
            summary.files_transferred,
            summary.files_skipped,
            summary.files_failed,
            summary.files_renamed,
            summary.total_files
        );
        if summary.entries_unreadable > 0 {
            eprintln!("Unreadable entries: {}", summary.entries_unreadable);
        }
        eprintln!(
            "Bytes transferred: {} of {}",
            Self::format_bytes(summary.bytes_transferred),
            Self::format_bytes(summary.total_bytes)
        );
        eprintln!("Elapsed: {}", Self::format_duration(self.elapsed(summary)));

        if let Ok(failures) = self.failures.lock() {
            if !failures.is_empty() {
                eprintln!();
                eprintln!("Failed files:");
                for notice in failures.iter() {
                    eprintln!("  {} ({}): {}", notice.path.display(), notice.kind, notice.reason);
                }
            }
        }
    }
}

/// Parse and validate command-line arguments, then run the job
fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    let cancel = CancelToken::new();
    let exit_code = match run_cli(&args, &cancel, arm_interrupts) {
        Ok(outcome) => outcome.exit_code(),
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();
}

/// Route Ctrl-C to the cancel token once the transfer pass starts.
///
/// Until then SIGINT keeps its default action, so an interrupt during the
/// scan or at the prompt ends the process with nothing written.
fn arm_interrupts(cancel: &CancelToken) {
    if let Err(e) = install_interrupt_handler(cancel) {
        tracing::warn!(error = %e, "could not install interrupt handler");
    }
}

/// Route SIGINT and SIGTERM to the cancel token.
///
/// The job stops before its next file; the file in flight completes.
#[cfg(unix)]
fn install_interrupt_handler(cancel: &CancelToken) -> io::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};

    signal_hook::flag::register(SIGINT, cancel.flag())?;
    signal_hook::flag::register(SIGTERM, cancel.flag())?;
    Ok(())
}

#[cfg(not(unix))]
fn install_interrupt_handler(_cancel: &CancelToken) -> io::Result<()> {
    Ok(())
}

/// Main CLI logic - separated for testability
///
/// `arm` runs right before the transfer pass, after confirmation.
fn run_cli(
    args: &Args,
    cancel: &CancelToken,
    arm: fn(&CancelToken),
) -> Result<Outcome, String> {
    if args.list_profiles {
        print!("{}", profile_table(profiles()));
        return Ok(Outcome::Listed);
    }

    let config = job_config(args)?;

    // Create the job (validates roots and profiles, creates the destination)
    let mut job = create_job(config).map_err(|e| format!("Job creation failed: {}", e))?;

    let report = CliReport::new(args.verbose, args.json);

    // Discovery pass
    scan_job(&mut job).map_err(|e| format!("Scanning failed: {}", e))?;
    if job.state == RunState::AbortedEmpty {
        eprintln!("No files found in {}; nothing to do.", job.plan.source_root.display());
        report.on_summary(&job.summary());
        return Ok(Outcome::NothingToDo);
    }

    print_plan(&job);
    let accepted = args.yes || prompt_confirmation();
    confirm_job(&mut job, accepted, Some(&report))
        .map_err(|e| format!("Confirmation failed: {}", e))?;
    if !accepted {
        return Ok(Outcome::Declined);
    }

    arm(cancel);
    run_job(&mut job, Some(&report), cancel)
        .map_err(|e| format!("Job execution failed: {}", e))?;

    if job.state == RunState::Cancelled {
        return Ok(Outcome::Interrupted);
    }

    let failed = report.failure_count();
    if failed > 0 {
        Err(format!("{} file(s) or entries failed to transfer", failed))
    } else {
        Ok(Outcome::Completed)
    }
}

/// Build the engine config from parsed arguments.
fn job_config(args: &Args) -> Result<JobConfig, String> {
    let src = required(&args.src, "--src")?;
    let dst = required(&args.dst, "--dst")?;
    let src_fs = required(&args.src_fs, "--src-fs")?;
    let dst_fs = required(&args.dst_fs, "--dst-fs")?;

    let mode = Mode::parse(&args.mode).ok_or_else(|| {
        format!("Invalid mode '{}'. Must be 'copy' or 'move'", args.mode)
    })?;

    let overwrite_policy = OverwritePolicy::parse(&args.overwrite).ok_or_else(|| {
        format!(
            "Invalid overwrite policy '{}'. Must be 'overwrite', 'skip', or 'smart'",
            args.overwrite
        )
    })?;

    let collision_policy = CollisionPolicy::parse(&args.on_collision).ok_or_else(|| {
        format!(
            "Invalid collision policy '{}'. Must be 'refuse' or 'suffix'",
            args.on_collision
        )
    })?;

    let mut config = JobConfig::new(src, dst, src_fs, dst_fs, mode);
    config.overwrite_policy = overwrite_policy;
    config.collision_policy = collision_policy;
    Ok(config)
}

fn required<'a, T>(value: &'a Option<T>, flag: &str) -> Result<&'a T, String> {
    value.as_ref().ok_or_else(|| format!("{} is required", flag))
}

/// Describe the pending transfer on stderr.
fn print_plan(job: &TransferJob) {
    let plan = &job.plan;
    let tally = job.tally();
    eprintln!("Ready to {} files:", plan.mode.to_string().to_lowercase());
    eprintln!("  Source: {} ({})", plan.source_root.display(), plan.source_profile);
    eprintln!(
        "  Destination: {} ({})",
        plan.destination_root.display(),
        plan.destination_profile
    );
    eprintln!(
        "  Total: {} across {} files",
        CliReport::format_bytes(tally.bytes_discovered),
        tally.files_discovered
    );

    let replaced = replaced_characters(plan.source_profile, plan.destination_profile);
    if !replaced.is_empty() {
        eprintln!("  Replaced with '_': {}", describe_characters(&replaced));
    }
}

/// Ask on stderr whether to start; anything but y/yes declines.
fn prompt_confirmation() -> bool {
    eprint!("Proceed? [y/N] ");
    let _ = io::stderr().flush();

    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(_) => is_yes(&answer),
        Err(_) => false,
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Printable characters as-is; control characters collapsed into a note.
fn describe_characters(chars: &[char]) -> String {
    let printable: String = chars.iter().filter(|c| !c.is_ascii_control()).collect();
    let controls = chars.iter().any(|c| c.is_ascii_control());
    match (printable.is_empty(), controls) {
        (_, false) => printable,
        (true, true) => "control characters".to_string(),
        (false, true) => format!("{} and control characters", printable),
    }
}

/// One line per profile: name, case handling and forbidden characters.
fn profile_table(profiles: &[FilesystemProfile]) -> String {
    let mut out = String::new();
    for profile in profiles {
        let forbidden: Vec<char> = (0x01u8..0x7f)
            .map(char::from)
            .filter(|&ch| !profile.is_legal(ch))
            .collect();
        out.push_str(&format!(
            "{:<6} {:<16} forbids: {}\n",
            profile.name(),
            if profile.is_case_sensitive() {
                "case-sensitive"
            } else {
                "case-insensitive"
            },
            describe_characters(&forbidden)
        ));
    }
    out
}

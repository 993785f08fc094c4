use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::output::Format;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("no background job found")]
    NoJob,
    #[error("failed to start worker: {0}")]
    Spawn(#[source] io::Error),
    #[error("status serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl JobError {
    fn file(path: &Path) -> impl FnOnce(io::Error) -> JobError + '_ {
        move |source| JobError::File { path: path.to_path_buf(), source }
    }
}

/// Persisted state. `failed` is never written; it is inferred from a dead PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Running,
    Completed,
}

/// Progress snapshot, overwritten after every processed id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub pid: u32,
    pub start_id: i64,
    pub end_id: i64,
    pub current: i64,
    pub total: i64,
    pub percentage: u32,
    pub state: JobState,
    pub start_time: DateTime<Utc>,
    pub output_file: Option<String>,
}

impl JobStatus {
    pub fn started(pid: u32, start_id: i64, end_id: i64, start_time: DateTime<Utc>) -> Self {
        JobStatus {
            pid,
            start_id,
            end_id,
            current: start_id - 1,
            total: end_id - start_id + 1,
            percentage: 0,
            state: JobState::Running,
            start_time,
            output_file: None,
        }
    }

    /// Record `id` as processed. `current` never moves backwards.
    pub fn advance(&mut self, id: i64) {
        self.current = self.current.max(id);
        self.percentage = percentage(self.processed(), self.total);
    }

    pub fn finish(&mut self, output_file: Option<String>) {
        self.current = self.end_id;
        self.percentage = 100;
        self.state = JobState::Completed;
        self.output_file = output_file;
    }

    pub fn processed(&self) -> i64 {
        (self.current - self.start_id + 1).clamp(0, self.total.max(0))
    }

    /// Remaining time at the average pace so far; None until an id is done.
    pub fn eta(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        let processed = self.processed();
        if self.state != JobState::Running || processed == 0 {
            return None;
        }
        let elapsed = (now - self.start_time).num_seconds().max(0);
        let remaining = (self.total - processed).max(0);
        Some(chrono::Duration::seconds(elapsed * remaining / processed))
    }
}

fn percentage(processed: i64, total: i64) -> u32 {
    if total <= 0 {
        return 0;
    }
    ((100 * processed) as f64 / total as f64).round() as u32
}

// ── Status file ──

#[derive(Debug)]
pub enum StatusRead {
    Missing,
    /// Present but unreadable or unparsable.
    Indeterminate(String),
    Found(JobStatus),
}

/// Single-writer status file. Writes go through a temp file and a rename,
/// so a reader sees either the old or the new snapshot.
pub struct StatusStore {
    path: PathBuf,
}

impl StatusStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn write(&self, status: &JobStatus) -> Result<(), JobError> {
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(status)?;
        let mut file = File::create(&tmp).map_err(JobError::file(&tmp))?;
        file.write_all(json.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(JobError::file(&tmp))?;
        std::fs::rename(&tmp, &self.path).map_err(JobError::file(&self.path))?;
        Ok(())
    }

    pub fn read(&self) -> StatusRead {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return StatusRead::Missing,
            Err(e) => return StatusRead::Indeterminate(e.to_string()),
        };
        match serde_json::from_str(&content) {
            Ok(status) => StatusRead::Found(status),
            Err(e) => StatusRead::Indeterminate(e.to_string()),
        }
    }
}

// ── Phase ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Idle,
    Running,
    Completed,
    /// Status says running but the process is gone.
    Failed,
    Indeterminate,
}

impl JobPhase {
    pub fn derive(read: &StatusRead, alive: bool) -> Self {
        match read {
            StatusRead::Missing => JobPhase::Idle,
            StatusRead::Indeterminate(_) => JobPhase::Indeterminate,
            StatusRead::Found(s) => match (s.state, alive) {
                (JobState::Completed, _) => JobPhase::Completed,
                (JobState::Running, true) => JobPhase::Running,
                (JobState::Running, false) => JobPhase::Failed,
            },
        }
    }
}

#[derive(Debug)]
pub struct JobReport {
    pub phase: JobPhase,
    pub read: StatusRead,
    pub alive: bool,
}

// ── Worker side ──

/// Progress writer used inside the worker. Write failures are logged and
/// otherwise ignored so a full disk never stops the scrape.
pub struct JobTracker {
    store: StatusStore,
    status: JobStatus,
}

impl JobTracker {
    pub fn new(store: StatusStore, status: JobStatus) -> Self {
        Self { store, status }
    }

    pub fn status(&self) -> &JobStatus {
        &self.status
    }

    /// Persist the initial snapshot before any id is processed.
    pub fn begin(&self) {
        self.persist();
    }

    pub fn on_progress(&mut self, id: i64) {
        self.status.advance(id);
        self.persist();
    }

    pub fn finish(&mut self, output_file: Option<String>) {
        self.status.finish(output_file);
        self.persist();
    }

    fn persist(&self) {
        if let Err(e) = self.store.write(&self.status) {
            debug!("Status write skipped: {}", e);
        }
    }
}

// ── Controller side ──

pub struct JobController<'a> {
    settings: &'a Settings,
}

impl<'a> JobController<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    pub fn store(&self) -> StatusStore {
        StatusStore::new(self.settings.status_file())
    }

    /// Spawn a detached worker for `start..=end` and return its PID.
    /// Overwrites the bookkeeping of any previous job.
    pub fn start(
        &self,
        start: i64,
        end: i64,
        delay_ms: u64,
        format: Format,
    ) -> Result<u32, JobError> {
        let previous = self.status();
        if previous.phase == JobPhase::Running {
            warn!("A background job is already running; its status will be overwritten");
        }

        let started_at = Utc::now();
        let exe = std::env::current_exe().map_err(JobError::Spawn)?;
        let mut cmd = Command::new(exe);
        cmd.arg("worker")
            .arg(start.to_string())
            .arg(end.to_string())
            .arg("--format")
            .arg(format.as_str())
            .arg("--delay-ms")
            .arg(delay_ms.to_string())
            .arg("--started-at")
            .arg(started_at.to_rfc3339());
        self.launch(cmd, start, end, started_at)
    }

    /// Run `cmd` detached with its output appended to the log file, then
    /// record its PID and initial status.
    fn launch(
        &self,
        mut cmd: Command,
        start: i64,
        end: i64,
        started_at: DateTime<Utc>,
    ) -> Result<u32, JobError> {
        let log_path = self.settings.log_file();
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(JobError::file(&log_path))?;
        let log_err = log.try_clone().map_err(JobError::file(&log_path))?;

        cmd.stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let child = cmd.spawn().map_err(JobError::Spawn)?;
        let pid = child.id();

        let pid_path = self.settings.pid_file();
        std::fs::write(&pid_path, pid.to_string()).map_err(JobError::file(&pid_path))?;
        self.record_start(pid, start, end, started_at)?;
        Ok(pid)
    }

    /// Write the initial status unless the worker `pid` already wrote its own,
    /// which may be further along.
    fn record_start(
        &self,
        pid: u32,
        start: i64,
        end: i64,
        started_at: DateTime<Utc>,
    ) -> Result<(), JobError> {
        let store = self.store();
        if let StatusRead::Found(s) = store.read() {
            if s.pid == pid {
                return Ok(());
            }
        }
        store.write(&JobStatus::started(pid, start, end, started_at))
    }

    pub fn status(&self) -> JobReport {
        let read = self.store().read();
        let alive = match &read {
            StatusRead::Found(s) => is_alive(s.pid),
            _ => self.recorded_pid().is_some_and(is_alive),
        };
        JobReport {
            phase: JobPhase::derive(&read, alive),
            read,
            alive,
        }
    }

    /// Terminate the recorded worker. Returns the PID if a live one was signalled.
    pub fn cancel(&self) -> Result<Option<u32>, JobError> {
        let pid = match self.store().read() {
            StatusRead::Found(s) => Some(s.pid),
            _ => self.recorded_pid(),
        }
        .ok_or(JobError::NoJob)?;

        if !is_alive(pid) {
            return Ok(None);
        }
        terminate(pid).map_err(JobError::Spawn)?;
        Ok(Some(pid))
    }

    fn recorded_pid(&self) -> Option<u32> {
        std::fs::read_to_string(self.settings.pid_file())
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }
}

/// Signal-0 existence probe.
pub fn is_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        // SAFETY: signal 0 performs only the permission and existence check
        unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
    }

    #[cfg(not(unix))]
    {
        Command::new("tasklist")
            .args(["/FI", &format!("PID eq {}", pid), "/NH"])
            .output()
            .map(|o| String::from_utf8_lossy(&o.stdout).contains(&pid.to_string()))
            .unwrap_or(false)
    }
}

fn terminate(pid: u32) -> io::Result<()> {
    #[cfg(unix)]
    {
        // SAFETY: plain SIGTERM to a PID we recorded ourselves
        if unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) } == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(unix))]
    {
        let status = Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/F"])
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!("taskkill {} exited with {}", pid, status)))
        }
    }
}

fn min_sec(secs: i64) -> String {
    format!("{}m {}s", secs / 60, secs % 60)
}

pub fn print_report(report: &JobReport, now: DateTime<Utc>) {
    let status = match &report.read {
        StatusRead::Missing => {
            println!("\nNo background scrape job found.");
            println!("Start one with: hymn_scraper scrape <start> <end> --background\n");
            return;
        }
        StatusRead::Indeterminate(e) => {
            println!("\nStatus indeterminate: the status file could not be read ({})", e);
            println!("It may be mid-update; try again.\n");
            return;
        }
        StatusRead::Found(s) => s,
    };

    let state = match report.phase {
        JobPhase::Failed => "FAILED",
        _ if status.state == JobState::Completed => "COMPLETED",
        _ => "RUNNING",
    };

    println!("\n{}", "=".repeat(50));
    println!("BACKGROUND SCRAPE STATUS");
    println!("{}", "=".repeat(50));
    println!("Status:        {}", state);
    println!("Range:         Hymn {} - {}", status.start_id, status.end_id);
    println!(
        "Progress:      {} / {} ({}%)",
        status.processed(),
        status.total,
        status.percentage
    );
    if report.phase == JobPhase::Running {
        let elapsed = (now - status.start_time).num_seconds().max(0);
        println!("Elapsed Time:  {}", min_sec(elapsed));
        if let Some(eta) = status.eta(now) {
            println!("ETA:           ~{}", min_sec(eta.num_seconds()));
        }
    }
    if let Some(file) = &status.output_file {
        println!("Output File:   {}", file);
    }
    println!("PID:           {}", status.pid);
    println!(
        "Started:       {}",
        status.start_time.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
    );
    println!("{}", "=".repeat(50));

    if report.alive {
        println!("Process is running\n");
    } else if status.state == JobState::Running {
        println!("Process appears to have stopped unexpectedly\n");
    } else {
        println!("Process completed\n");
    }
}

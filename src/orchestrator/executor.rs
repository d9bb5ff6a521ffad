//! Compile execution: build-tool spawning, output streaming and cancellation.
//!
//! Integrates with the logging pipeline via LogCollector for:
//! - Full build output persistence
//! - Parsed milestone logging (progress steps, final status)

use futures::future::{BoxFuture, FutureExt};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;

use crate::config::{ForgeConfig, TargetConfig};
use crate::error::CompileError;
use crate::models::{CompileOutcome, RevisionId};
use crate::LogCollector;

/// External build tool invocation.
pub trait BuildTool: Send + Sync {
    /// Build `revision` from the working copy.
    ///
    /// When `cancel_rx` turns `true` the build is terminated and
    /// `CompileOutcome::Cancelled` is returned, never `Failed`.
    fn compile<'a>(
        &'a self,
        revision: &'a RevisionId,
        cancel_rx: watch::Receiver<bool>,
    ) -> BoxFuture<'a, Result<CompileOutcome, CompileError>>;
}

/// Parses `N/M` or `[ N%]` progress from build output.
///
/// Returns a percentage for lines like cargo's `Building [=====>   ] 512/1024: zed`
/// or make/cmake style `[ 45%]`.
fn parse_build_progress(line: &str) -> Option<u32> {
    if let Ok(re) = Regex::new(r"(?:^|\s|\])\s*(\d+)/(\d+)(?::|\]|\s|$)") {
        if let Some(caps) = re.captures(line) {
            if let (Ok(current), Ok(total)) = (caps[1].parse::<u32>(), caps[2].parse::<u32>()) {
                if total > 0 {
                    let progress = (current as f32 / total as f32 * 100.0) as u32;
                    return Some(progress.min(100));
                }
            }
        }
    }

    if let Ok(re) = Regex::new(r"\[\s*(\d+)%\]") {
        if let Some(caps) = re.captures(line) {
            if let Ok(progress) = caps[1].parse::<u32>() {
                return Some(progress.min(100));
            }
        }
    }

    None
}

/// Milestone lines worth surfacing in the parsed log.
fn is_milestone(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("Finished")
        || trimmed.starts_with("Bundling")
        || trimmed.starts_with("error:")
        || trimmed.starts_with("error[")
}

/// Signal every process in group `pgid`; an already empty group is not an error.
#[cfg(unix)]
fn signal_group(pgid: u32, signal: nix::sys::signal::Signal) {
    use nix::errno::Errno;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pgid as i32), signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => log::warn!(
            "[Build] [CANCEL] {:?} to process group {} failed: {}",
            signal,
            pgid,
            e
        ),
    }
}

/// Runs the configured build tool as a child process.
pub struct ProcessBuildTool {
    program: String,
    args: Vec<String>,
    working_dir: PathBuf,
    artifact: PathBuf,
    termination_grace: Duration,
    log_collector: Option<Arc<LogCollector>>,
}

impl ProcessBuildTool {
    pub fn new(
        target: &TargetConfig,
        working_dir: PathBuf,
        termination_grace: Duration,
        log_collector: Option<Arc<LogCollector>>,
    ) -> Self {
        ProcessBuildTool {
            program: target.build_program.clone(),
            args: target.command_args(),
            artifact: target.artifact_path(&working_dir),
            working_dir,
            termination_grace,
            log_collector,
        }
    }

    pub fn from_config(config: &ForgeConfig, log_collector: Option<Arc<LogCollector>>) -> Self {
        Self::new(
            &config.target,
            config.working_copy.clone(),
            config.termination_grace,
            log_collector,
        )
    }

    /// Program path; names containing `/` are relative to the working copy.
    fn resolved_program(&self) -> PathBuf {
        if self.program.contains('/') && !Path::new(&self.program).is_absolute() {
            self.working_dir.join(&self.program)
        } else {
            PathBuf::from(&self.program)
        }
    }

    fn handle_line(&self, line: &str, stderr: bool, last_progress: &mut u32) {
        if let Some(ref collector) = self.log_collector {
            if stderr {
                collector.log_str(format!("[STDERR] {}", line));
            } else {
                collector.log_str(line);
            }
        }

        if let Some(progress) = parse_build_progress(line) {
            if progress >= *last_progress + 10 {
                *last_progress = progress - progress % 10;
                log::info!(target: "parsed", "[Build] [PROGRESS] {}%", *last_progress);
            }
        }

        if is_milestone(line) {
            log::info!(target: "parsed", "[Build] {}", line.trim());
        }
    }

    /// Send one SIGTERM to the build's process group, then wait for it to exit.
    ///
    /// If it is still running after the grace period the whole group is killed.
    /// Group members that outlive the leader are killed as well, so nothing keeps
    /// writing into the working copy once this returns.
    async fn terminate(&self, child: &mut Child) -> Result<(), CompileError> {
        let pgid = child.id();

        #[cfg(unix)]
        {
            if let Some(pgid) = pgid {
                log::info!("[Build] [CANCEL] Sending SIGTERM to process group {}", pgid);
                signal_group(pgid, nix::sys::signal::Signal::SIGTERM);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = child.start_kill();
        }

        let result = match tokio::time::timeout(self.termination_grace, child.wait()).await {
            Ok(Ok(status)) => {
                log::info!("[Build] [CANCEL] Build tool exited after termination: {}", status);
                Ok(())
            }
            Ok(Err(e)) => Err(CompileError::Wait(e.to_string())),
            Err(_) => {
                log::warn!(
                    "[Build] [CANCEL] Build tool still running after {:?}, killing",
                    self.termination_grace
                );
                #[cfg(unix)]
                {
                    if let Some(pgid) = pgid {
                        signal_group(pgid, nix::sys::signal::Signal::SIGKILL);
                    }
                }
                #[cfg(not(unix))]
                {
                    let _ = child.start_kill();
                }
                child
                    .wait()
                    .await
                    .map(|_| ())
                    .map_err(|e| CompileError::Wait(format!("Failed to kill build tool: {}", e)))
            }
        };

        #[cfg(unix)]
        {
            if let Some(pgid) = pgid {
                signal_group(pgid, nix::sys::signal::Signal::SIGKILL);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = pgid;
        }

        result
    }

    async fn run(
        &self,
        revision: &RevisionId,
        mut cancel_rx: watch::Receiver<bool>,
    ) -> Result<CompileOutcome, CompileError> {
        if *cancel_rx.borrow() {
            return Ok(CompileOutcome::Cancelled);
        }

        let program = self.resolved_program();
        log::info!(
            target: "parsed",
            "[Build] [EXECUTOR] Building {} with {} {}",
            revision.short(),
            program.display(),
            self.args.join(" ")
        );

        let mut command = Command::new(&program);
        command
            .args(&self.args)
            .current_dir(&self.working_dir)
            .env("CARGO_BUILD_JOBS", num_cpus::get().to_string())
            .env("APPFORGE_REVISION", revision.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so termination reaches compiler subprocesses too
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| CompileError::Spawn {
            program: program.display().to_string(),
            reason: e.to_string(),
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CompileError::Output("Failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| CompileError::Output("Failed to capture stderr".to_string()))?;

        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();
        let mut stdout_closed = false;
        let mut stderr_closed = false;
        let mut cancel_closed = false;
        let mut last_progress = 0u32;

        let status: ExitStatus = loop {
            tokio::select! {
                line = stdout_lines.next_line(), if !stdout_closed => match line {
                    Ok(Some(line)) => self.handle_line(&line, false, &mut last_progress),
                    Ok(None) => stdout_closed = true,
                    Err(e) => {
                        log::warn!("[Build] stdout read error: {}", e);
                        stdout_closed = true;
                    }
                },
                line = stderr_lines.next_line(), if !stderr_closed => match line {
                    Ok(Some(line)) => self.handle_line(&line, true, &mut last_progress),
                    Ok(None) => stderr_closed = true,
                    Err(e) => {
                        log::warn!("[Build] stderr read error: {}", e);
                        stderr_closed = true;
                    }
                },
                changed = cancel_rx.changed(), if !cancel_closed => match changed {
                    Ok(()) if *cancel_rx.borrow() => {
                        log::info!(target: "parsed", "[Build] [CANCEL] Cancellation requested");
                        self.terminate(&mut child).await?;
                        return Ok(CompileOutcome::Cancelled);
                    }
                    Ok(()) => {}
                    Err(_) => cancel_closed = true,
                },
                status = child.wait() => {
                    break status.map_err(|e| CompileError::Wait(e.to_string()))?;
                }
            }
        };

        // Drain output still buffered in the pipes
        let drain = Duration::from_millis(200);
        while !stdout_closed {
            match tokio::time::timeout(drain, stdout_lines.next_line()).await {
                Ok(Ok(Some(line))) => self.handle_line(&line, false, &mut last_progress),
                _ => stdout_closed = true,
            }
        }
        while !stderr_closed {
            match tokio::time::timeout(drain, stderr_lines.next_line()).await {
                Ok(Ok(Some(line))) => self.handle_line(&line, true, &mut last_progress),
                _ => stderr_closed = true,
            }
        }

        if !status.success() {
            let code = status.code().unwrap_or(-1);
            log::error!(target: "parsed", "[Build] [FAILED] Build tool exited with {}", status);
            return Ok(CompileOutcome::Failed(code));
        }

        if !self.artifact.exists() {
            return Err(CompileError::ArtifactMissing(self.artifact.clone()));
        }

        log::info!(
            target: "parsed",
            "[Build] [SUCCESS] Artifact ready at {}",
            self.artifact.display()
        );
        Ok(CompileOutcome::Succeeded(self.artifact.clone()))
    }
}

impl BuildTool for ProcessBuildTool {
    fn compile<'a>(
        &'a self,
        revision: &'a RevisionId,
        cancel_rx: watch::Receiver<bool>,
    ) -> BoxFuture<'a, Result<CompileOutcome, CompileError>> {
        self.run(revision, cancel_rx).boxed()
    }
}

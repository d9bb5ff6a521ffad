use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use appforge::config::{loader, Settings, TARGET_ENV};
use appforge::log_collector::{ensure_logs_dir_exists, get_global_logs_path};
use appforge::orchestrator::{load_last_successful, Orchestrator, RunReport};
use appforge::source::{GitSource, SourceControl};
use appforge::system::prompt;
use appforge::{ConfigError, ForgeConfig, ForgeError, LogCollector, LogLine};

#[tokio::main]
async fn main() {
    // =========================================================================
    // SETTINGS - needed before logging for the configured log directory
    // =========================================================================
    let settings = match load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("appforge: {}", e);
            std::process::exit(1);
        }
    };

    // =========================================================================
    // LOG COLLECTOR - every log::* call goes to disk, milestones to the console
    // =========================================================================
    let log_collector = match init_logging(&settings) {
        Ok(collector) => collector,
        Err(e) => {
            eprintln!("appforge: logging initialization failed: {}", e);
            std::process::exit(1);
        }
    };
    appforge::log_info!("appforge {} starting", appforge::VERSION);

    let result = run(&settings, Arc::clone(&log_collector)).await;

    let code = match &result {
        Ok(report) => {
            print_report(report);
            0
        }
        Err(e) => {
            log::error!("[Main] {}", e);
            eprintln!("appforge: {}", e.user_message());
            e.exit_code()
        }
    };

    // Final status lines must reach disk before exit
    if let Err(e) = log_collector.wait_for_empty().await {
        eprintln!("[Main] WARNING: log flush failed: {}", e);
    }
    std::process::exit(code);
}

fn load_settings() -> Result<Settings, ConfigError> {
    let path = loader::get_global_settings_path()?;
    loader::load_settings_or_default(&path)
}

fn init_logging(settings: &Settings) -> Result<Arc<LogCollector>, String> {
    let log_dir = get_global_logs_path(settings.log_dir.as_deref())?;
    ensure_logs_dir_exists(&log_dir)?;

    let (console_tx, mut console_rx) = mpsc::channel::<LogLine>(1024);
    let log_collector = Arc::new(LogCollector::new(log_dir, console_tx)?);

    log::set_boxed_logger(Box::new((*log_collector).clone()))
        .map(|()| log::set_max_level(log::LevelFilter::Debug))
        .map_err(|e| format!("Failed to set LogCollector as global logger: {}", e))?;

    // Console shows milestones and problems; full build output stays in the log file
    tokio::spawn(async move {
        while let Some(line) = console_rx.recv().await {
            let important = matches!(line.level, Some(log::Level::Warn | log::Level::Error));
            if line.is_parsed() || important {
                eprintln!("[{}] {}", line.timestamp, line.message);
            }
        }
    });

    eprintln!(
        "Logging to {}",
        log_collector.full_log_path().display()
    );
    Ok(log_collector)
}

/// Target from the environment, then the settings default.
fn selected_target(settings: &Settings) -> String {
    std::env::var(TARGET_ENV)
        .ok()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| settings.default_target.clone())
}

/// Cheap check used only to decide whether to ask the rebuild question.
async fn probably_up_to_date(config: &ForgeConfig) -> bool {
    let last = match load_last_successful(config) {
        Ok(Some(last)) => last,
        Ok(None) => return false,
        Err(e) => {
            log::warn!("[Main] Ignoring unreadable build record: {}", e);
            return false;
        }
    };
    if !config.target.install_path().exists() {
        return false;
    }

    let probe = GitSource::new(
        config.target.repo_url.clone(),
        config.target.branch.clone(),
        config.working_copy.clone(),
    );
    match probe.fetch_head().await {
        Ok(head) => head == last,
        Err(e) => {
            log::warn!("[Main] Could not query remote head: {}", e);
            false
        }
    }
}

async fn run(settings: &Settings, log_collector: Arc<LogCollector>) -> Result<RunReport, ForgeError> {
    let target_name = selected_target(settings);
    let config = settings.forge_config(&target_name)?;
    log::info!(
        target: "parsed",
        "[Main] Target '{}' from {} ({})",
        config.target.name,
        config.target.repo_url,
        config.target.branch
    );

    let up_to_date = probably_up_to_date(&config).await;
    let name = config.target.name.clone();
    let policy = tokio::task::spawn_blocking(move || prompt::prompt_policy(&name, up_to_date))
        .await
        .map_err(|e| ConfigError::ValidationFailed(format!("prompt task failed: {}", e)))?
        .map_err(ConfigError::IoError)?;
    log::debug!("[Main] Policy: {:?}", policy);

    // Ctrl-C cancels the running compile the same way an upstream change does
    let (abort_tx, abort_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("[Main] Interrupt received, aborting");
            abort_tx.send_replace(true);
            // Keep the sender alive so the abort stays observable
            std::future::pending::<()>().await;
        }
    });

    let orchestrator =
        Orchestrator::from_config(config, policy, Some(log_collector))?.with_abort(abort_rx);
    orchestrator.preflight()?;
    orchestrator.run().await
}

fn print_report(report: &RunReport) {
    if report.up_to_date {
        println!(
            "{} is up to date ({})",
            report.installed.display(),
            report.revision.short()
        );
        return;
    }
    println!(
        "Installed {} at {}",
        report.revision.short(),
        report.installed.display()
    );
    if report.restarts > 0 {
        println!("Restarted {} time(s) because upstream advanced", report.restarts);
    }
    if let Some(backup) = &report.backup {
        println!("Previous installation kept at {}", backup.display());
    }
    if let Some(launcher) = &report.launcher {
        println!("Launcher: {}", launcher.display());
    }
}

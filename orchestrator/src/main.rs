//! deployctl - Entry Point
//!
//! Runs one deployment request against the configured fleet and exits with
//! a status code reflecting the terminal state.

use std::env;
use std::process::ExitCode;

use colored::Colorize;
use tracing::{error, info};

use deployctl::app::options::{CliArgs, USAGE};
use deployctl::app::run::run;
use deployctl::filesys::file::File;
use deployctl::logs::{init_logging, LogOptions};
use deployctl::models::status::{DeploymentState, DeploymentStatus};
use deployctl::storage::layout::StorageLayout;
use deployctl::storage::settings::Settings;
use deployctl::utils::version_info;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = CliArgs::parse(env::args().skip(1));

    // Print version and exit
    if args.flag("version") {
        println!("{}", serde_json::to_string_pretty(&version_info())?);
        return Ok(ExitCode::SUCCESS);
    }

    if args.flag("help") {
        println!("{}", USAGE);
        return Ok(ExitCode::SUCCESS);
    }

    // Retrieve the settings file
    let default_layout = match args.storage_dir() {
        Some(dir) => StorageLayout::new(dir),
        None => StorageLayout::default(),
    };
    let settings_file = match args.settings_path() {
        Some(path) => File::new(path),
        None => default_layout.settings_file(),
    };
    let settings = if settings_file.exists().await {
        settings_file.read_json::<Settings>().await?
    } else {
        Settings::default()
    };
    let layout = match (&settings.storage_dir, args.storage_dir()) {
        (Some(dir), None) => StorageLayout::new(dir),
        _ => default_layout,
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level,
        json_format: settings.log_json,
        log_dir: Some(layout.logs_dir().path().to_path_buf()),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    let request = match args.request(&settings.defaults) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("{} {}\n\n{}", "error:".red().bold(), e, USAGE);
            return Ok(ExitCode::from(2));
        }
    };

    if request.environment.is_production() && !args.confirmed_production() {
        eprintln!(
            "{} production deployments require --confirm-production",
            "refused:".red().bold()
        );
        return Ok(ExitCode::from(2));
    }

    info!(
        settings = %settings_file.path().display(),
        "Running deployctl {}",
        version_info().version
    );
    let status = match run(settings, layout, request, await_shutdown_signal()).await {
        Ok(status) => status,
        Err(e) => {
            error!("Failed to run the deployment: {e}");
            return Err(e.into());
        }
    };

    print_summary(&status);
    Ok(match status.state {
        DeploymentState::Completed => ExitCode::SUCCESS,
        DeploymentState::RolledBack => ExitCode::from(3),
        _ => ExitCode::FAILURE,
    })
}

fn print_summary(status: &DeploymentStatus) {
    let state = match status.state {
        DeploymentState::Completed => status.state.as_str().green().bold(),
        DeploymentState::RolledBack => status.state.as_str().yellow().bold(),
        _ => status.state.as_str().red().bold(),
    };

    println!();
    println!("{} {}", "deployment".bold(), status.deployment_id);
    println!("  {:<12} {}", "state", state);
    println!("  {:<12} {} ({})", "version", status.version, status.strategy);
    println!("  {:<12} {}", "environment", status.environment);
    println!("  {:<12} {:.2}%", "error rate", status.error_rate);
    println!("  {:<12} {}", "rollback", if status.rollback_triggered { "triggered" } else { "no" });

    for phase in &status.phases {
        let mark = if phase.succeeded { "ok".green() } else { "failed".red() };
        println!("    {:<26} {:>6} ms  {}", format!("{:?}", phase.phase), phase.duration_ms, mark);
    }

    if let Some(err) = &status.error {
        println!("  {:<12} {}", "error", err.red());
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                _ => {
                    error!("Failed to install signal handlers, falling back to Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, shutting down...");
        }
    }
}

//! mce fingerprint daemon (mced)
//!
//! Tracks the fingerprint daemon (fpd), keeps it identifying while the
//! device is in a state where a fingerprint may wake it up, and performs
//! the wakeup when a finger is recognized and no power key press got in
//! the way.
//!
//! # Tasks
//! - **Event loop**: owns the fingerprint module; the only place state changes
//! - **fpd link**: Unix socket connection to fpd, reconnecting as needed
//! - **Control server**: Unix socket for `mcetool` (status, settings, signal injection)
//! - **Timers**: one sleeping task per armed timer
//!
//! # Process
//! - Restrictive umask (0007), working directory set to /
//! - PID file guarding against a second instance
//! - Graceful shutdown on SIGINT/SIGTERM with resource cleanup

mod event_loop;
mod fpd_link;
mod lines;
mod server;

use anyhow::Context;
use std::path::{Path, PathBuf};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, error, info, warn};

use mce_core::constants::{paths, wakelocks};
use mce_core::wakelock::SysfsWakelock;
use mce_core::{FingerprintModule, SettingsStore, Wakelock};

use event_loop::{Event, EventLoop};
use fpd_link::FpdLink;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Command line options
#[derive(Debug)]
struct Options {
    socket_path: PathBuf,
    fpd_socket_path: PathBuf,
    settings_path: PathBuf,
    pid_file: PathBuf,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(paths::CONTROL_SOCKET),
            fpd_socket_path: PathBuf::from(paths::FPD_SOCKET),
            settings_path: PathBuf::from(paths::SETTINGS_FILE),
            pid_file: PathBuf::from(paths::PID_FILE),
        }
    }
}

enum Command {
    Run(Options),
    Exit,
}

// ============================================================================
// Process Setup
// ============================================================================

/// Set restrictive umask
fn set_secure_umask() {
    // 0007 = group members may use the control socket, others may not
    // SAFETY: umask is always safe to call - it simply sets the file creation mask for the process.
    unsafe { libc::umask(0o007) };
    debug!("Umask set to 0007");
}

/// Change to root directory
fn secure_working_directory() {
    if std::env::set_current_dir("/").is_err() {
        warn!("Could not chdir to /");
    }
}

/// Validate socket path for security
fn validate_socket_path(path: &Path) -> Result<(), String> {
    if !path.is_absolute() {
        return Err("Socket path must be absolute".into());
    }

    let text = path.to_string_lossy();
    if text.contains("..") {
        return Err("Socket path contains path traversal".into());
    }

    if let Some(parent) = path.parent() {
        if !parent.exists() {
            return Err(format!("Parent directory does not exist: {:?}", parent));
        }
    }

    // Symlink attack prevention
    if path.symlink_metadata().map(|m| m.file_type().is_symlink()).unwrap_or(false) {
        return Err("Socket path is a symlink - refusing for security".into());
    }

    Ok(())
}

// ============================================================================
// PID File Management
// ============================================================================

/// Write PID file, refusing to start if another instance is alive
fn write_pid_file(path: &Path) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    if path.exists() {
        if let Ok(content) = std::fs::read_to_string(path) {
            if let Ok(old_pid) = content.trim().parse::<i32>() {
                // SAFETY: kill with signal 0 only checks whether the process exists.
                if unsafe { libc::kill(old_pid, 0) } == 0 {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::AddrInUse,
                        format!("Another instance is running (PID {})", old_pid),
                    ));
                }
            }
        }
        // Stale PID file, remove it
        let _ = std::fs::remove_file(path);
    }

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o644)
        .open(path)?;

    writeln!(file, "{}", std::process::id())?;
    file.sync_all()?;

    debug!("PID file written: {}", path.display());
    Ok(())
}

fn cleanup(options: &Options) {
    for path in [&options.socket_path, &options.pid_file] {
        if path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }
    info!("Cleanup complete");
}

// ============================================================================
// CLI
// ============================================================================

fn print_help() {
    eprintln!("mced {} - mce fingerprint wakeup daemon", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    mced [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -f, --foreground       Run in foreground (don't daemonize)");
    eprintln!("    -s, --socket PATH      Control socket path [{}]", paths::CONTROL_SOCKET);
    eprintln!("        --fpd-socket PATH  fpd socket path [{}]", paths::FPD_SOCKET);
    eprintln!("        --settings PATH    Settings file [{}]", paths::SETTINGS_FILE);
    eprintln!("        --pid-file PATH    PID file [{}]", paths::PID_FILE);
    eprintln!("    -v, --version          Print version");
    eprintln!("    -h, --help             Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    MCE_LOG                Log filter (trace, debug, info, warn, error)");
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let mut options = Options::default();

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        let mut value = |name: &str| {
            iter.next()
                .map(PathBuf::from)
                .ok_or_else(|| format!("{} requires a path argument", name))
        };
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                return Ok(Command::Exit);
            }
            "-v" | "--version" => {
                println!("mced {}", VERSION);
                return Ok(Command::Exit);
            }
            // Foreground mode is always on (no daemonization implemented)
            "-f" | "--foreground" => {}
            "-s" | "--socket" => options.socket_path = value("--socket")?,
            "--fpd-socket" => options.fpd_socket_path = value("--fpd-socket")?,
            "--settings" => options.settings_path = value("--settings")?,
            "--pid-file" => options.pid_file = value("--pid-file")?,
            other => return Err(format!("Unknown argument: {}", other)),
        }
    }

    Ok(Command::Run(options))
}

/// journald when available, stdout otherwise; returns true for journald
fn init_logging() -> bool {
    use tracing_subscriber::prelude::*;

    let log_level = std::env::var("MCE_LOG").unwrap_or_else(|_| "info".to_string());

    if Path::new("/run/systemd/journal/socket").exists() {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(&log_level))
                    .init();
                return true;
            }
            Err(e) => eprintln!("Failed to create journald layer: {}, falling back to stdout", e),
        }
    }

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(&log_level)
        .init();
    false
}

fn make_wakelock() -> Wakelock {
    if SysfsWakelock::is_supported() {
        Wakelock::new(wakelocks::FINGERPRINT, Box::new(SysfsWakelock::new()))
    } else {
        info!("kernel wakelocks not available");
        Wakelock::disabled(wakelocks::FINGERPRINT)
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let options = match parse_args(&args) {
        Ok(Command::Run(options)) => options,
        Ok(Command::Exit) => return Ok(()),
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    let use_journald = init_logging();

    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        error!("PANIC at {}: {}", location, panic_info);
    }));

    set_secure_umask();
    secure_working_directory();

    info!("STARTUP: mced {} starting", VERSION);
    info!("STARTUP: Logging to {}", if use_journald { "systemd journal" } else { "stdout" });

    if let Err(e) = validate_socket_path(&options.socket_path) {
        error!("Invalid socket path: {}", e);
        std::process::exit(1);
    }

    let store = SettingsStore::load(&options.settings_path)
        .with_context(|| format!("loading {}", options.settings_path.display()))?;
    info!("STARTUP: Settings: {} ({:?})", store.path().display(), store.settings());

    if let Err(e) = write_pid_file(&options.pid_file) {
        error!("Could not write PID file: {}", e);
        std::process::exit(1);
    }

    let result = run(&options, store).await;
    cleanup(&options);

    if let Err(e) = &result {
        error!("mced failed: {:#}", e);
    }
    info!("SHUTDOWN: mced terminated");
    result
}

async fn run(options: &Options, store: SettingsStore) -> anyhow::Result<()> {
    let (events, rx) = tokio::sync::mpsc::unbounded_channel();

    let listener = server::bind(&options.socket_path)?;
    let server_task = tokio::spawn(server::run_server(listener, events.clone()));

    let (fpd, fpd_task) = FpdLink::spawn(options.fpd_socket_path.clone(), events.clone());
    info!("STARTUP: fpd socket: {}", options.fpd_socket_path.display());

    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let shutdown = events.clone();
    let signal_task = tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("SIGNAL: Received SIGINT"),
            _ = sigterm.recv() => info!("SIGNAL: Received SIGTERM"),
        }
        let _ = shutdown.send(Event::Shutdown);
    });

    let module = FingerprintModule::new(store.settings().clone(), make_wakelock());
    EventLoop::new(module, store, fpd, events).run(rx).await;

    signal_task.abort();
    server_task.abort();
    fpd_task.abort();
    Ok(())
}

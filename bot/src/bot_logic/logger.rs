use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Logs go to stderr and to a fresh timestamped file; stdout carries the replies.
pub fn setup_logging(log_dir: &Path, log_level: &str) -> Result<()> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)?;
    }

    let log_file_name = format!("pricebot_{}.log", chrono::Local::now().format("%Y-%m-%d_%H-%M-%S"));
    let log_path = log_dir.join(log_file_name);
    let log_file = fern::log_file(&log_path)?;

    // Only this run's log file is kept
    cleanup_old_logs(log_dir, &log_path)?;

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(parse_level(log_level))
        // Connection pool chatter drowns out the feed logs at debug level.
        .level_for("hyper_util", log::LevelFilter::Info)
        .level_for("reqwest", log::LevelFilter::Info)
        .chain(std::io::stderr())
        .chain(log_file)
        .apply()?;

    Ok(())
}

pub fn parse_level(log_level: &str) -> log::LevelFilter {
    match log_level.trim().to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "warn" => log::LevelFilter::Warn,
        "error" | "fatal" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => log::LevelFilter::Info,
    }
}

fn cleanup_old_logs(log_dir: &Path, keep: &Path) -> Result<()> {
    let stale: Vec<PathBuf> = fs::read_dir(log_dir)?
        .filter_map(|res| res.ok())
        .map(|e| e.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "log"))
        .filter(|path| path.file_name() != keep.file_name())
        .collect();

    for path in &stale {
        if let Err(e) = fs::remove_file(path) {
            eprintln!("Failed to delete old log file {:?}: {}", path, e);
        }
    }

    Ok(())
}

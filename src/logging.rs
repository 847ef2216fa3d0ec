//! Tracing subscriber setup

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber.
///
/// Logs go to stderr, or to `log_file` through a non-blocking writer when
/// given. The returned guard must be kept alive until the program exits so
/// buffered lines are flushed.
pub fn init(log_file: Option<&Path>, json: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let (writer, guard, ansi) = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            if let Some(dir) = dir {
                std::fs::create_dir_all(dir)?;
            }
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("log path {:?} has no file name", path))?;
            let appender =
                tracing_appender::rolling::never(dir.unwrap_or_else(|| Path::new(".")), file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), None, true),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(false);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))?;

    Ok(guard)
}

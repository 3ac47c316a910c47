use flexi_logger::{DeferredNow, Duplicate, FileSpec, Logger, LoggerHandle, WriteMode};
use log::Record;
use std::io::Write;
use std::thread;

/// Initializes logging for the agent. The returned handle must stay alive
/// for the duration of the process.
///
/// Lines go to a file under `logs/`; warnings and errors are duplicated to
/// stderr so a foreground run shows driver trouble immediately. The
/// `verbose` flag widens the spec from info to debug.
pub fn init_logger(verbose: bool) -> Result<LoggerHandle, Box<dyn std::error::Error>> {
    let spec = if verbose { "agent=debug" } else { "agent=info" };
    let handle = Logger::try_with_str(spec)?
        .log_to_file(FileSpec::default().directory("logs").suppress_timestamp())
        .append()
        .duplicate_to_stderr(Duplicate::Warn)
        .write_mode(WriteMode::BufferAndFlush)
        .format(log_format)
        .start()?;
    Ok(handle)
}

/// One line per record: millisecond timestamp, level, emitting module and
/// thread, message.
///
/// Ring pacing happens well below one second, so the timestamp carries
/// milliseconds. The thread name is what separates interleaved worker
/// lines (`probe-extract`, `probe-inject-3`, the event pump) from REST
/// traffic, and the module path names the subsystem without the noise of
/// file and line numbers.
fn log_format(w: &mut dyn Write, now: &mut DeferredNow, record: &Record) -> std::io::Result<()> {
    let thread = thread::current();
    write!(
        w,
        "{} {:5} {}@{}: {}",
        now.format("%Y-%m-%dT%H:%M:%S%.3f"),
        record.level(),
        thread.name().unwrap_or("?"),
        record.target(),
        record.args()
    )
}

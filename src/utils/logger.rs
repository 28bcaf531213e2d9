use chrono::Local;
use eyre::Result;
use fern::Dispatch;

/// Sets up the application logger with console output.
///
/// # Arguments
/// * `level` - Maximum level to emit
///
/// # Errors
/// * If a global logger is already installed
pub fn setup_logger(level: log::LevelFilter) -> Result<()> {
    Dispatch::new()
        .level(level)
        // r2d2 reports every pool checkout at debug
        .level_for("r2d2", log::LevelFilter::Warn)
        .chain(std::io::stderr())
        // Format log messages with time and log level
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                message
            ));
        })
        .apply()?;
    Ok(())
}

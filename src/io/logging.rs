//! Logging to files.

use std::path::Path;

use anyhow;
use log::LevelFilter;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;

/// Initialises file logging for the process.
///
/// Records sent to the `xcfeat-output` target are written verbatim to `output_path`. When
/// `diagnostics_path` is given, all other records at or above `level` are written there with a
/// timestamp, level and target.
///
/// # Errors
///
/// Errors if a log file cannot be created, or if a logger has already been set for the process.
pub fn init_file_logger<P: AsRef<Path>>(
    output_path: P,
    diagnostics_path: Option<&Path>,
    level: LevelFilter,
) -> Result<(), anyhow::Error> {
    let output = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{m}{n}")))
        .build(output_path.as_ref())?;
    let mut builder = Config::builder()
        .appender(Appender::builder().build("output", Box::new(output)))
        .logger(
            Logger::builder()
                .appender("output")
                .additive(false)
                .build("xcfeat-output", LevelFilter::Info),
        );
    let root = match diagnostics_path {
        Some(path) => {
            let diagnostics = FileAppender::builder()
                .encoder(Box::new(PatternEncoder::new(
                    "{d(%Y-%m-%d %H:%M:%S)} {l:<5} {t} - {m}{n}",
                )))
                .build(path)?;
            builder = builder
                .appender(Appender::builder().build("diagnostics", Box::new(diagnostics)));
            Root::builder().appender("diagnostics").build(level)
        }
        None => Root::builder().build(LevelFilter::Off),
    };
    let config = builder.build(root)?;
    log4rs::init_config(config)?;
    Ok(())
}

//! Formatted output to the `xcfeat-output` logger.

use std::fmt;

use log;

const XCFEAT_BANNER_LENGTH: usize = 103;

/// Logs a warning to the `xcfeat-output` logger.
macro_rules! xcfeat_warn {
    ($fmt:expr $(, $($arg:tt)*)?) => {
        log::warn!($fmt, $($($arg)*)?);
        log::warn!(target: "xcfeat-output", $fmt, $($($arg)*)?);
    }
}

/// Logs a main output line to the `xcfeat-output` logger.
macro_rules! xcfeat_output {
    ($fmt:expr $(, $($arg:tt)*)?) => { log::info!(target: "xcfeat-output", $fmt, $($($arg)*)?); }
}

pub(crate) use {xcfeat_output, xcfeat_warn};

/// Logs a nicely formatted macro-section beginning to the `xcfeat-output` logger.
pub(crate) fn log_macsec_begin(sectitle: &str) {
    let width = XCFEAT_BANNER_LENGTH - 14;
    let sectitle_space = sectitle.to_string() + " ";
    xcfeat_output!("❬❬❬❬❬ [Begin] {sectitle_space:❬<width$}");
}

/// Logs a nicely formatted macro-section ending to the `xcfeat-output` logger.
pub(crate) fn log_macsec_end(sectitle: &str) {
    let width = XCFEAT_BANNER_LENGTH - 14;
    let sectitle_space = sectitle.to_string() + " ";
    xcfeat_output!("❭❭❭❭❭ [ End ] {sectitle_space:❭<width$}");
}

/// Logs a nicely formatted subtitle to the `xcfeat-output` logger.
pub(crate) fn log_subtitle(subtitle: &str) {
    let length = subtitle.chars().count();
    let bar = "═".repeat(length);
    xcfeat_output!("{}", subtitle);
    xcfeat_output!("{}", bar);
}

/// Turns a boolean into a string of `yes` or `no`.
pub(crate) fn nice_bool(b: bool) -> String {
    if b {
        "yes".to_string()
    } else {
        "no".to_string()
    }
}

/// A trait for logging `xcfeat` outputs nicely.
pub(crate) trait XcFeatOutput: fmt::Debug + fmt::Display {
    /// Logs display output nicely.
    fn log_output_display(&self) {
        let lines = self.to_string();
        lines.lines().for_each(|line| {
            xcfeat_output!("{line}");
        })
    }
}

// Blanket implementation
impl<T> XcFeatOutput for T where T: fmt::Debug + fmt::Display {}

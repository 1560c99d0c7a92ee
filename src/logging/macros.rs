// SPDX-License-Identifier: Apache-2.0 OR MIT
// Logging macros for convenient logging
//
// Each macro checks the logger's filter before formatting, so disabled
// levels cost one atomic load.

/// Log a formatted message at an explicit severity
///
/// # Examples
/// ```ignore
/// log_at!(logger, Severity::Notice, "cache warmed in {}ms", elapsed);
/// ```
#[macro_export]
macro_rules! log_at {
    ($logger:expr, $severity:expr, $($arg:tt)+) => {{
        let logger = &$logger;
        let severity = $severity;
        if logger.enabled(severity) {
            logger.log(severity, &::std::format!($($arg)+));
        }
    }};
}

/// Log a message with catastrophic severity
///
/// # Examples
/// ```ignore
/// log_catastrophic!(logger, "state store corrupted: {}", path);
/// ```
#[macro_export]
macro_rules! log_catastrophic {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::Severity::Catastrophic, $($arg)+)
    };
}

/// Log a message with emergency severity
#[macro_export]
macro_rules! log_emergency {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::Severity::Emergency, $($arg)+)
    };
}

/// Log a message with critical severity
#[macro_export]
macro_rules! log_critical {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::Severity::Critical, $($arg)+)
    };
}

/// Log a message with error severity
///
/// # Examples
/// ```ignore
/// log_error!(logger, "failed to open {}: {}", path, err);
/// ```
#[macro_export]
macro_rules! log_error {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::Severity::Error, $($arg)+)
    };
}

/// Log a message with warning severity
#[macro_export]
macro_rules! log_warning {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::Severity::Warning, $($arg)+)
    };
}

/// Log a message with notice severity
#[macro_export]
macro_rules! log_notice {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::Severity::Notice, $($arg)+)
    };
}

/// Log a message with info severity
///
/// # Examples
/// ```ignore
/// log_info!(logger, "listening on {}", addr);
/// ```
#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::Severity::Info, $($arg)+)
    };
}

/// Log a message with trace severity
#[macro_export]
macro_rules! log_trace {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::Severity::Trace, $($arg)+)
    };
}

/// Log a message with debug severity
#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::Severity::Debug, $($arg)+)
    };
}

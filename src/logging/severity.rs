// SPDX-License-Identifier: Apache-2.0 OR MIT
// Severity levels for log records (ascending: higher is more severe)

use serde::{Deserialize, Serialize};

/// Log severity levels (0-8, higher is more severe)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Developer diagnostics
    Debug = 0,
    /// Fine-grained execution traces
    Trace = 1,
    /// Informational
    Info = 2,
    /// Significant normal condition
    Notice = 3,
    /// Warning conditions (approaching limits, degraded paths)
    Warning = 4,
    /// Error conditions
    Error = 5,
    /// Critical conditions
    Critical = 6,
    /// Immediate action required
    Emergency = 7,
    /// System unusable
    Catastrophic = 8,
}

impl Severity {
    /// Number of severity levels
    pub const COUNT: usize = 9;

    /// All levels in ascending order
    pub const ALL: [Severity; Severity::COUNT] = [
        Severity::Debug,
        Severity::Trace,
        Severity::Info,
        Severity::Notice,
        Severity::Warning,
        Severity::Error,
        Severity::Critical,
        Severity::Emergency,
        Severity::Catastrophic,
    ];

    /// Get severity level as u8 (0-8)
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Index into per-severity tables
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Get severity name as static string
    pub const fn as_str(self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Notice => "NOTICE",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
            Severity::Emergency => "EMERGENCY",
            Severity::Catastrophic => "CATASTROPHIC",
        }
    }

    /// Create from u8 value (returns None if invalid)
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Severity::Debug),
            1 => Some(Severity::Trace),
            2 => Some(Severity::Info),
            3 => Some(Severity::Notice),
            4 => Some(Severity::Warning),
            5 => Some(Severity::Error),
            6 => Some(Severity::Critical),
            7 => Some(Severity::Emergency),
            8 => Some(Severity::Catastrophic),
            _ => None,
        }
    }

    /// True when this level is at or above `threshold`
    #[inline]
    pub fn is_at_least(self, threshold: Severity) -> bool {
        self >= threshold
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown severity '{}'", s))
    }
}

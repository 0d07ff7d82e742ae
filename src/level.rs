// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The twelve-value severity scale and its single-character wire encoding.

use crate::error::Error;
use std::fmt;
use std::str::FromStr;

/// Severity levels, ordered most to least severe. `Output` sits between
/// `Notice` and `Info`: it is for normal user-visible program output that
/// should also land in the log.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Panic = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    Output = 6,
    Info = 7,
    Debug = 8,
    Fine = 9,
    Trace = 10,
    Lowest = 11,
}

/// `PACEWNOIDFTL`, index-aligned with [`Level`]'s discriminants.
const LEVEL_CHARS: [char; 12] = [
    'P', 'A', 'C', 'E', 'W', 'N', 'O', 'I', 'D', 'F', 'T', 'L',
];

impl Level {
    /// The single-character tag used in the formatted output line.
    pub fn as_char(self) -> char {
        LEVEL_CHARS[self as usize]
    }

    /// All levels, most to least severe, for iteration in tests and docs.
    pub const ALL: [Level; 12] = [
        Level::Panic,
        Level::Alert,
        Level::Critical,
        Level::Error,
        Level::Warning,
        Level::Notice,
        Level::Output,
        Level::Info,
        Level::Debug,
        Level::Fine,
        Level::Trace,
        Level::Lowest,
    ];
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Panic => "panic",
            Level::Alert => "alert",
            Level::Critical => "critical",
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Notice => "notice",
            Level::Output => "output",
            Level::Info => "info",
            Level::Debug => "debug",
            Level::Fine => "fine",
            Level::Trace => "trace",
            Level::Lowest => "lowest",
        })
    }
}

impl FromStr for Level {
    type Err = Error;

    /// Case-insensitive, including the aliases `panic|emergency`,
    /// `critical|crit`, `error|err`, `warning|warn`, `output|out`. An
    /// unrecognized name is `Error::BadLevelName`; callers that need a
    /// usable fallback should use [`Level::parse_or_lowest`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Ok(match lower.as_str() {
            "panic" | "emergency" => Level::Panic,
            "alert" => Level::Alert,
            "critical" | "crit" => Level::Critical,
            "error" | "err" => Level::Error,
            "warning" | "warn" => Level::Warning,
            "notice" => Level::Notice,
            "output" | "out" => Level::Output,
            "info" => Level::Info,
            "debug" => Level::Debug,
            "fine" => Level::Fine,
            "trace" => Level::Trace,
            "lowest" => Level::Lowest,
            _ => return Err(Error::BadLevelName(s.to_string())),
        })
    }
}

impl Level {
    /// Parses a level name, falling back to [`Level::Lowest`] on failure
    /// while still reporting the error, so a caller that wants a usable
    /// level even on bad input doesn't have to also discard the failure.
    pub fn parse_or_lowest(s: &str) -> std::result::Result<Level, (Level, Error)> {
        match s.parse::<Level>() {
            Ok(level) => Ok(level),
            Err(e) => Err((Level::Lowest, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_most_to_least_severe() {
        assert!(Level::Panic < Level::Alert);
        assert!(Level::Output < Level::Info);
        assert!(Level::Trace < Level::Lowest);
    }

    #[test]
    fn chars_match_spec() {
        let chars: String = Level::ALL.iter().map(|l| l.as_char()).collect();
        assert_eq!(chars, "PACEWNOIDFTL");
    }

    #[test]
    fn aliases_resolve() {
        assert_eq!("emergency".parse::<Level>().unwrap(), Level::Panic);
        assert_eq!("CRIT".parse::<Level>().unwrap(), Level::Critical);
        assert_eq!("err".parse::<Level>().unwrap(), Level::Error);
        assert_eq!("warn".parse::<Level>().unwrap(), Level::Warning);
        assert_eq!("out".parse::<Level>().unwrap(), Level::Output);
    }

    #[test]
    fn unknown_name_falls_back_to_lowest() {
        let (level, err) = Level::parse_or_lowest("bogus").unwrap_err();
        assert_eq!(level, Level::Lowest);
        assert!(matches!(err, Error::BadLevelName(_)));
    }
}

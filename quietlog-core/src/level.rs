use std::{fmt, str::FromStr};

use colored::{ColoredString, Colorize};
use log::LevelFilter;

use crate::error::Error;

/// Severity of a log message, and minimum severity accepted by a channel.
///
/// `Disabled` sorts above every real severity, so a channel whose minimum is
/// `Disabled` lets nothing through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum Level {
    Trace = 0,
    #[default]
    Debug = 1,
    Info = 2,
    Warning = 3,
    Error = 4,
    Disabled = 5,
}

impl Level {
    pub const ALL: [Level; 6] = [
        Level::Trace,
        Level::Debug,
        Level::Info,
        Level::Warning,
        Level::Error,
        Level::Disabled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Disabled => "DISABLED",
        }
    }

    pub(crate) fn from_u8(value: u8) -> Level {
        match value {
            0 => Level::Trace,
            1 => Level::Debug,
            2 => Level::Info,
            3 => Level::Warning,
            4 => Level::Error,
            _ => Level::Disabled,
        }
    }

    /// Colors `text` the way the console shows this level.
    pub fn paint(self, text: &str) -> ColoredString {
        match self {
            Level::Error => text.red(),
            Level::Warning => text.yellow(),
            Level::Info => text.green(),
            Level::Debug => text.blue(),
            Level::Trace => text.purple(),
            Level::Disabled => text.normal(),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Ok(Level::Trace),
            "DEBUG" => Ok(Level::Debug),
            "INFO" => Ok(Level::Info),
            "WARN" | "WARNING" => Ok(Level::Warning),
            "ERROR" => Ok(Level::Error),
            "DISABLED" | "OFF" => Ok(Level::Disabled),
            _ => Err(Error::InvalidLevel(s.to_string())),
        }
    }
}

impl From<log::Level> for Level {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Level::Error,
            log::Level::Warn => Level::Warning,
            log::Level::Info => Level::Info,
            log::Level::Debug => Level::Debug,
            log::Level::Trace => Level::Trace,
        }
    }
}

impl From<Level> for LevelFilter {
    fn from(level: Level) -> Self {
        match level {
            Level::Trace => LevelFilter::Trace,
            Level::Debug => LevelFilter::Debug,
            Level::Info => LevelFilter::Info,
            Level::Warning => LevelFilter::Warn,
            Level::Error => LevelFilter::Error,
            Level::Disabled => LevelFilter::Off,
        }
    }
}

#[test]
fn test_level_ordering_and_parsing() {
    assert!(Level::Trace < Level::Debug);
    assert!(Level::Error < Level::Disabled);
    assert_eq!("warn".parse::<Level>().unwrap(), Level::Warning);
    assert_eq!(" Info ".parse::<Level>().unwrap(), Level::Info);
    assert!(matches!(
        "loud".parse::<Level>(),
        Err(Error::InvalidLevel(s)) if s == "loud"
    ));
    for level in Level::ALL {
        assert_eq!(level.to_string().parse::<Level>().unwrap(), level);
        assert_eq!(Level::from_u8(level as u8), level);
    }
    assert_eq!(Level::from(log::Level::Warn), Level::Warning);
    assert_eq!(LevelFilter::from(Level::Disabled), LevelFilter::Off);
}

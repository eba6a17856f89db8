use std::ops::BitOr;

use crate::level::Level;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SilenceOptions(u32);

impl SilenceOptions {
    pub const NONE: SilenceOptions = SilenceOptions(0);
    /// Drop the message entirely.
    pub const COMPLETELY_SILENCE_LOGS: SilenceOptions = SilenceOptions(1);
    pub const DEMOTE_ERRORS_TO_WARNINGS: SilenceOptions = SilenceOptions(1 << 1);
    /// Log warnings and errors at debug level.
    pub const DEMOTE_TO_DEBUG: SilenceOptions = SilenceOptions(1 << 2);

    pub fn contains(self, other: SilenceOptions) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SilenceOptions {
    type Output = SilenceOptions;

    fn bitor(self, rhs: Self) -> Self::Output {
        SilenceOptions(self.0 | rhs.0)
    }
}

/// Lowers or suppresses the messages of a scope that expects errors.
///
/// Call sites pass the silencer along to
/// [`Channel::log_silenced`](crate::Channel::log_silenced); it has no effect on
/// anything it is not handed to.
///
/// ```
/// use quietlog_core::{ErrorSilencer, Level, SilenceOptions};
///
/// let silencer = ErrorSilencer::new(SilenceOptions::DEMOTE_ERRORS_TO_WARNINGS);
/// assert_eq!(silencer.effective_level(Level::Error), Some(Level::Warning));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrorSilencer {
    options: SilenceOptions,
}

impl ErrorSilencer {
    pub fn new(options: SilenceOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> SilenceOptions {
        self.options
    }

    /// Level a message of `level` is logged at under this silencer, `None` if dropped.
    pub fn effective_level(&self, level: Level) -> Option<Level> {
        if self.options.contains(SilenceOptions::COMPLETELY_SILENCE_LOGS) {
            return None;
        }
        if self.options.contains(SilenceOptions::DEMOTE_TO_DEBUG) && level >= Level::Warning {
            return Some(Level::Debug);
        }
        if self.options.contains(SilenceOptions::DEMOTE_ERRORS_TO_WARNINGS) && level == Level::Error
        {
            return Some(Level::Warning);
        }
        Some(level)
    }
}

#[test]
fn test_silencer_levels() {
    let none = ErrorSilencer::default();
    assert_eq!(none.effective_level(Level::Error), Some(Level::Error));

    let silent = ErrorSilencer::new(SilenceOptions::COMPLETELY_SILENCE_LOGS);
    assert_eq!(silent.effective_level(Level::Error), None);
    assert_eq!(silent.effective_level(Level::Trace), None);

    let demote = ErrorSilencer::new(SilenceOptions::DEMOTE_ERRORS_TO_WARNINGS);
    assert_eq!(demote.effective_level(Level::Error), Some(Level::Warning));
    assert_eq!(demote.effective_level(Level::Info), Some(Level::Info));

    let debug = ErrorSilencer::new(
        SilenceOptions::DEMOTE_TO_DEBUG | SilenceOptions::DEMOTE_ERRORS_TO_WARNINGS,
    );
    assert_eq!(debug.effective_level(Level::Error), Some(Level::Debug));
    assert_eq!(debug.effective_level(Level::Warning), Some(Level::Debug));
    assert_eq!(debug.effective_level(Level::Trace), Some(Level::Trace));
    assert!(debug.options().contains(SilenceOptions::DEMOTE_TO_DEBUG));
    assert!(!debug.options().contains(SilenceOptions::COMPLETELY_SILENCE_LOGS));
}

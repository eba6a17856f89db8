use std::{
    collections::HashMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Mutex,
};

use crate::{debugger::log_diagnostic, error::Error, level::Level};

/// Persists per-channel levels chosen by users across runs.
///
/// Called with the configurator lock held: implementations must not log through
/// channels of the same configurator.
pub trait LevelStore: Send + Sync {
    fn restore_level(&self, channel: &str) -> Option<Level>;
    fn save_level(&self, channel: &str, level: Level);
}

#[derive(Debug, Default)]
pub struct MemoryLevelStore {
    levels: Mutex<HashMap<String, Level>>,
}

impl MemoryLevelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_levels<I, S>(levels: I) -> Self
    where
        I: IntoIterator<Item = (S, Level)>,
        S: Into<String>,
    {
        Self {
            levels: Mutex::new(levels.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }
}

impl LevelStore for MemoryLevelStore {
    fn restore_level(&self, channel: &str) -> Option<Level> {
        self.levels.lock().unwrap().get(channel).copied()
    }

    fn save_level(&self, channel: &str, level: Level) {
        self.levels.lock().unwrap().insert(channel.into(), level);
    }
}

/// Level store backed by a text file of `channel=LEVEL` lines.
///
/// The whole file is rewritten on every save.
pub struct FileLevelStore {
    path: PathBuf,
    levels: Mutex<HashMap<String, Level>>,
}

impl FileLevelStore {
    /// Opens the store, reading the file if it exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let levels = match fs::read_to_string(&path) {
            Ok(content) => parse_levels(&content)?,
            Err(e) if e.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            levels: Mutex::new(levels),
        })
    }

    fn persist(&self, levels: &HashMap<String, Level>) -> Result<(), Error> {
        let mut lines: Vec<String> = levels
            .iter()
            .map(|(channel, level)| format!("{channel}={level}\n"))
            .collect();
        lines.sort();
        fs::write(&self.path, lines.concat())?;
        Ok(())
    }
}

fn parse_levels(content: &str) -> Result<HashMap<String, Level>, Error> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            let (channel, level) = line
                .rsplit_once('=')
                .ok_or_else(|| Error::InvalidLevel(line.to_string()))?;
            Ok((channel.trim().to_string(), level.parse()?))
        })
        .collect()
}

impl LevelStore for FileLevelStore {
    fn restore_level(&self, channel: &str) -> Option<Level> {
        self.levels.lock().unwrap().get(channel).copied()
    }

    fn save_level(&self, channel: &str, level: Level) {
        let mut levels = self.levels.lock().unwrap();
        levels.insert(channel.into(), level);
        if let Err(e) = self.persist(&levels) {
            log_diagnostic(&format!(
                "unable to save level of channel {channel} to {}: {e}",
                self.path.display()
            ));
        }
    }
}

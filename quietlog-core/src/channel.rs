use std::{
    fmt,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU8, Ordering},
    },
};

use uuid::Uuid;

use crate::{
    level::Level,
    silencer::ErrorSilencer,
    worker::{OutputWorker, WriteOption},
};

/// Stable handle of a registered channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(Uuid);

impl ChannelId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Shared state of a channel, read by its owner and rewritten by the configurator.
#[derive(Debug)]
pub struct ChannelDescriptor {
    name: String,
    level: AtomicU8,
    user_overrode: AtomicBool,
    prefix: Mutex<String>,
}

impl ChannelDescriptor {
    pub fn new(name: &str, level: Level) -> Self {
        Self {
            name: name.into(),
            level: AtomicU8::new(level as u8),
            user_overrode: AtomicBool::new(false),
            prefix: Mutex::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// True once someone picked this channel's level explicitly.
    pub fn user_overrode(&self) -> bool {
        self.user_overrode.load(Ordering::Relaxed)
    }

    pub(crate) fn store_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    pub(crate) fn set_explicit_level(&self, level: Level) {
        self.store_level(level);
        self.user_overrode.store(true, Ordering::Relaxed);
    }
}

/// A named source of log messages with its own minimum level.
///
/// The channel is registered with the worker's configurator for as long as the handle
/// lives. Cloning registers a second channel of the same name, starting from the same
/// level and prefix.
pub struct Channel {
    id: ChannelId,
    descriptor: Arc<ChannelDescriptor>,
    worker: Arc<OutputWorker>,
}

impl Channel {
    pub fn new(name: &str, worker: &Arc<OutputWorker>) -> Self {
        let configurator = worker.configurator();
        let descriptor = Arc::new(ChannelDescriptor::new(
            name,
            configurator.global_minimum_log_level(),
        ));
        let id = configurator.register(descriptor.clone());
        Self {
            id,
            descriptor,
            worker: worker.clone(),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn minimum_output_level(&self) -> Level {
        self.descriptor.level()
    }

    /// Sets this channel's level and saves it to the configurator's level store.
    pub fn set_minimum_output_level(&self, level: Level) {
        self.set_minimum_output_level_no_save(level);
        self.worker
            .configurator()
            .on_channel_level_change(self.name(), level);
    }

    /// Sets this channel's level without saving it. Restores still leave it alone.
    pub fn set_minimum_output_level_no_save(&self, level: Level) {
        self.descriptor.set_explicit_level(level);
    }

    pub fn is_enabled(&self, level: Level) -> bool {
        level != Level::Disabled && level >= self.descriptor.level()
    }

    /// Text put in front of every message of this channel.
    pub fn prefix(&self) -> String {
        self.descriptor.prefix.lock().unwrap().clone()
    }

    pub fn set_prefix(&self, prefix: &str) {
        *self.descriptor.prefix.lock().unwrap() = prefix.into();
    }

    fn emit(&self, level: Level, text: &str, relogged: bool) {
        if !self.is_enabled(level) {
            return;
        }
        let prefix = self.descriptor.prefix.lock().unwrap().clone();
        let text = if prefix.is_empty() {
            text.to_string()
        } else {
            format!("{prefix}{text}")
        };
        self.worker
            .write(self.name(), level, &text, relogged, WriteOption::Default);
    }

    pub fn log(&self, level: Level, text: &str) {
        self.emit(level, text, false);
    }

    /// Formats the message only if the channel accepts `level`.
    pub fn log_args(&self, level: Level, args: fmt::Arguments<'_>) {
        if self.is_enabled(level) {
            self.emit(level, &args.to_string(), false);
        }
    }

    pub fn log_silenced(&self, silencer: &ErrorSilencer, level: Level, text: &str) {
        if let Some(level) = silencer.effective_level(level) {
            self.emit(level, text, false);
        }
    }

    /// Logs a message that was already logged once elsewhere, such as a line forwarded
    /// from another process. It skips the immediate debugger output.
    pub fn relog(&self, level: Level, text: &str) {
        self.emit(level, text, true);
    }

    pub fn trace(&self, text: &str) {
        self.log(Level::Trace, text);
    }

    pub fn debug(&self, text: &str) {
        self.log(Level::Debug, text);
    }

    pub fn info(&self, text: &str) {
        self.log(Level::Info, text);
    }

    pub fn warning(&self, text: &str) {
        self.log(Level::Warning, text);
    }

    pub fn error(&self, text: &str) {
        self.log(Level::Error, text);
    }
}

impl Clone for Channel {
    fn clone(&self) -> Self {
        let descriptor = Arc::new(ChannelDescriptor::new(self.name(), self.descriptor.level()));
        if self.descriptor.user_overrode() {
            descriptor.set_explicit_level(self.descriptor.level());
        }
        *descriptor.prefix.lock().unwrap() = self.prefix();
        let id = self.worker.configurator().register(descriptor.clone());
        Self {
            id,
            descriptor,
            worker: self.worker.clone(),
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.worker.configurator().unregister(self.id);
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

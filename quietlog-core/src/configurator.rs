use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::{
    channel::{ChannelDescriptor, ChannelId},
    level::Level,
    store::LevelStore,
};

struct ConfiguratorState {
    channels: HashMap<ChannelId, Arc<ChannelDescriptor>>,
    global_minimum_level: Level,
    store: Option<Arc<dyn LevelStore>>,
}

impl ConfiguratorState {
    /// Level a channel of this name should have when nobody picked one explicitly.
    fn restored_level(&self, name: &str) -> Level {
        self.store
            .as_ref()
            .and_then(|store| store.restore_level(name))
            .unwrap_or(self.global_minimum_level)
    }

    fn set_channel(&self, name: &str, level: Level, override_user: bool) {
        // Names are not unique: every channel with this name is updated.
        for descriptor in self.channels.values() {
            if descriptor.name() == name && (override_user || !descriptor.user_overrode()) {
                descriptor.store_level(level);
            }
        }
    }

    fn restore_all(&self) {
        for descriptor in self.channels.values() {
            if !descriptor.user_overrode() {
                descriptor.store_level(self.restored_level(descriptor.name()));
            }
        }
    }
}

/// Registry of live channels and owner of their levels.
///
/// Holds the process default level and an optional [`LevelStore`] remembering levels
/// chosen for individual channels. A channel whose level was set explicitly through
/// [`Channel::set_minimum_output_level`](crate::Channel::set_minimum_output_level) is
/// never reset by a restore.
pub struct Configurator {
    state: Mutex<ConfiguratorState>,
}

impl Default for Configurator {
    fn default() -> Self {
        Self::new(Level::Debug)
    }
}

impl Configurator {
    pub fn new(global_minimum_level: Level) -> Self {
        Self {
            state: Mutex::new(ConfiguratorState {
                channels: HashMap::new(),
                global_minimum_level,
                store: None,
            }),
        }
    }

    /// Adds a channel to the registry and gives it its restored level.
    pub fn register(&self, descriptor: Arc<ChannelDescriptor>) -> ChannelId {
        let mut state = self.state.lock().unwrap();
        if !descriptor.user_overrode() {
            descriptor.store_level(state.restored_level(descriptor.name()));
        }
        let id = ChannelId::new();
        state.channels.insert(id, descriptor);
        id
    }

    pub fn unregister(&self, id: ChannelId) -> Option<Arc<ChannelDescriptor>> {
        self.state.lock().unwrap().channels.remove(&id)
    }

    pub fn global_minimum_log_level(&self) -> Level {
        self.state.lock().unwrap().global_minimum_level
    }

    /// Sets the default level and forces it onto every registered channel, including
    /// channels whose level was set explicitly.
    pub fn set_global_minimum_log_level(&self, level: Level) {
        let mut state = self.state.lock().unwrap();
        state.global_minimum_level = level;
        for descriptor in state.channels.values() {
            descriptor.store_level(level);
        }
    }

    /// Sets the default level and restores every channel, so explicitly set channels
    /// keep their level.
    pub fn set_default_level(&self, level: Level) {
        let mut state = self.state.lock().unwrap();
        state.global_minimum_level = level;
        state.restore_all();
    }

    /// Restores the level of every channel named `name`.
    pub fn restore_channel_log_level(&self, name: &str) {
        let state = self.state.lock().unwrap();
        let level = state.restored_level(name);
        state.set_channel(name, level, false);
    }

    pub fn restore_descriptor_log_level(&self, descriptor: &ChannelDescriptor) {
        let state = self.state.lock().unwrap();
        let level = state.restored_level(descriptor.name());
        if !descriptor.user_overrode() {
            descriptor.store_level(level);
        }
    }

    pub fn restore_all_channel_log_levels(&self) {
        self.state.lock().unwrap().restore_all();
    }

    /// Installs (or removes, with `None`) the level store, then restores every channel.
    pub fn set_level_store(&self, store: Option<Arc<dyn LevelStore>>) {
        let mut state = self.state.lock().unwrap();
        state.store = store;
        state.restore_all();
    }

    /// Sets the level of every channel named `name`, explicit choices included.
    pub fn set_channel(&self, name: &str, level: Level) {
        self.state.lock().unwrap().set_channel(name, level, true);
    }

    /// Saves a level explicitly chosen for a channel.
    pub fn on_channel_level_change(&self, name: &str, level: Level) {
        let state = self.state.lock().unwrap();
        if let Some(store) = &state.store {
            store.save_level(name, level);
        }
    }

    /// Name and level of every registered channel, sorted by name.
    pub fn channels(&self) -> Vec<(String, Level)> {
        let state = self.state.lock().unwrap();
        let mut channels: Vec<_> = state
            .channels
            .values()
            .map(|descriptor| (descriptor.name().to_string(), descriptor.level()))
            .collect();
        channels.sort();
        channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLevelStore;

    fn register(configurator: &Configurator, name: &str) -> Arc<ChannelDescriptor> {
        let descriptor = Arc::new(ChannelDescriptor::new(name, Level::Trace));
        configurator.register(descriptor.clone());
        descriptor
    }

    #[test]
    fn test_register_takes_default_level() {
        let configurator = Configurator::new(Level::Warning);
        let net = register(&configurator, "net");
        assert_eq!(net.level(), Level::Warning);
        assert_eq!(configurator.channels(), vec![("net".into(), Level::Warning)]);
    }

    #[test]
    fn test_unregister_removes_channel() {
        let configurator = Configurator::default();
        let descriptor = Arc::new(ChannelDescriptor::new("net", Level::Trace));
        let id = configurator.register(descriptor);
        register(&configurator, "gpu");
        assert!(configurator.unregister(id).is_some());
        assert!(configurator.unregister(id).is_none());
        assert_eq!(configurator.channels(), vec![("gpu".into(), Level::Debug)]);
    }

    #[test]
    fn test_global_minimum_level_overwrites_everything() {
        let configurator = Configurator::default();
        let net = register(&configurator, "net");
        let gpu = register(&configurator, "gpu");
        gpu.set_explicit_level(Level::Error);
        configurator.set_global_minimum_log_level(Level::Info);
        assert_eq!(net.level(), Level::Info);
        assert_eq!(gpu.level(), Level::Info);
        assert_eq!(configurator.global_minimum_log_level(), Level::Info);
    }

    #[test]
    fn test_default_level_change_respects_explicit_levels() {
        let configurator = Configurator::default();
        let net = register(&configurator, "net");
        let gpu = register(&configurator, "gpu");
        let audio = register(&configurator, "audio");
        gpu.set_explicit_level(Level::Error);
        configurator.set_default_level(Level::Warning);
        assert_eq!(net.level(), Level::Warning);
        assert_eq!(audio.level(), Level::Warning);
        assert_eq!(gpu.level(), Level::Error);
    }

    #[test]
    fn test_set_channel_updates_duplicates() {
        let configurator = Configurator::default();
        let first = register(&configurator, "net");
        let second = register(&configurator, "net");
        let other = register(&configurator, "gpu");
        second.set_explicit_level(Level::Trace);
        configurator.set_channel("net", Level::Error);
        assert_eq!(first.level(), Level::Error);
        assert_eq!(second.level(), Level::Error);
        assert_eq!(other.level(), Level::Debug);
    }

    #[test]
    fn test_restore_uses_store_then_default() {
        let configurator = Configurator::new(Level::Info);
        let net = register(&configurator, "net");
        let gpu = register(&configurator, "gpu");
        let explicit = register(&configurator, "net");
        explicit.set_explicit_level(Level::Trace);

        configurator.set_level_store(Some(Arc::new(MemoryLevelStore::with_levels([(
            "net",
            Level::Error,
        )]))));
        assert_eq!(net.level(), Level::Error);
        assert_eq!(gpu.level(), Level::Info);
        assert_eq!(explicit.level(), Level::Trace);

        // Registering after the store is installed restores from it too.
        let late = register(&configurator, "net");
        assert_eq!(late.level(), Level::Error);

        net.store_level(Level::Debug);
        configurator.restore_channel_log_level("net");
        assert_eq!(net.level(), Level::Error);
        assert_eq!(explicit.level(), Level::Trace);

        gpu.store_level(Level::Trace);
        configurator.restore_descriptor_log_level(&gpu);
        assert_eq!(gpu.level(), Level::Info);

        configurator.set_level_store(None);
        assert_eq!(net.level(), Level::Info);
        configurator.restore_all_channel_log_levels();
        assert_eq!(late.level(), Level::Info);
    }

    #[test]
    fn test_level_change_is_saved() {
        let configurator = Configurator::default();
        let store = Arc::new(MemoryLevelStore::new());
        configurator.set_level_store(Some(store.clone()));
        configurator.on_channel_level_change("net", Level::Warning);
        assert_eq!(store.restore_level("net"), Some(Level::Warning));
    }
}

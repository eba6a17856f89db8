//! # quietlog
//! Asynchronous logger that aggregates repeated messages instead of flooding its outputs.
//!
//! ## Usage
//! ```toml
//! // Cargo.toml
//! ...
//! [dependencies]
//! quietlog = "0.1.0"
//! ```
//!
//! ```rust
//! use quietlog::logger_config;
//!
//! let _guard = logger_config()
//!    .init_global();
//! log::info!("Hello, world!");
//! // guard ensures logs are flushed when dropped
//! ```
//!
//! Every `log` target is a channel with its own minimum level. Records go to a queue
//! drained by a background thread, so logging never waits on output.
//!
//! ## Logging to files
//! The log file is created if it does not exist and appended to if it does.
//!
//! ```rust
//! use quietlog::logger_config;
//!
//! std::fs::remove_file("/tmp/quietlog_app.log").ok();
//! let _guard = logger_config()
//!     .with_log_file("/tmp/quietlog_app.log")
//!     .expect("Unable to create log file")
//!     .no_stdout() // disable stdout logging if needed
//!     .init_global();
//!
//! log::info!(target: "net", "Hello, world!");
//! drop(_guard); // ensure logs are flushed
//! assert!(std::fs::read_to_string("/tmp/quietlog_app.log").unwrap().ends_with("[INFO][net] Hello, world!\n"));
//! ```
//!
//! ## Repeated messages
//! A message repeated in a tight loop is printed a few times, then only counted.
//! The count shows up later as a single `[Aggregated N times]` line.
//!
//! ```rust
//! use quietlog::logger_config;
//!
//! std::fs::remove_file("/tmp/quietlog_repeated.log").ok();
//! let _guard = logger_config()
//!     .with_log_file("/tmp/quietlog_repeated.log")
//!     .unwrap()
//!     .no_stdout()
//!     .init_global();
//!
//! for _ in 0..30 {
//!     log::warn!(target: "net", "socket timeout");
//! }
//! drop(_guard);
//! let content = std::fs::read_to_string("/tmp/quietlog_repeated.log").unwrap();
//! assert_eq!(content.lines().count(), 11);
//! assert!(content.contains("[WARNING][net] [Aggregated 20 times] socket timeout\n"));
//! ```
//!
//! ## Channel levels
//! ```rust
//! use quietlog::{Level, logger_config};
//!
//! std::fs::remove_file("/tmp/quietlog_levels.log").ok();
//! let _guard = logger_config()
//!     .with_log_file("/tmp/quietlog_levels.log")
//!     .unwrap()
//!     .no_stdout()
//!     .with_level(Level::Info)
//!     .init_global();
//!
//! quietlog::set_channel_level("gpu", Level::Trace);
//! log::debug!(target: "gpu", "shown, gpu accepts everything");
//! log::debug!(target: "net", "hidden below the default level");
//! quietlog::configurator().unwrap().set_channel("gpu", Level::Error);
//! log::warn!(target: "gpu", "hidden again");
//! drop(_guard);
//! let content = std::fs::read_to_string("/tmp/quietlog_levels.log").unwrap();
//! assert_eq!(content.lines().count(), 1);
//! assert!(content.ends_with("[DEBUG][gpu] shown, gpu accepts everything\n"));
//! ```

use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, LazyLock, Once, RwLock},
};

use log::{LevelFilter, Log};
use quietlog_core::{FileLevelStore, FileSink, WorkerBuilder};

pub use quietlog_core::{
    Channel, Configurator, Error, ErrorSilencer, Level, LevelStore, MemoryLevelStore,
    OutputSink, OutputWorker, RepeatedMessageConfig, SilenceOptions,
};

/// The running logger: its worker and the channel of every `log` target seen so far.
struct LoggerState {
    worker: Arc<OutputWorker>,
    channels: RwLock<HashMap<String, Channel>>,
}

/// Global logger state, replaced by every call to [`ConfigBuilder::init_global`].
static GLOBAL_LOGGER: LazyLock<RwLock<Option<Arc<LoggerState>>>> =
    LazyLock::new(|| RwLock::new(None));

static INSTALL_LOGGER: Once = Once::new();

fn current() -> Option<Arc<LoggerState>> {
    GLOBAL_LOGGER.read().unwrap().clone()
}

/// `log` implementation routing each record to the channel named after its target.
pub struct QuietLogger;

impl Log for QuietLogger {
    fn enabled(&self, _: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let Some(state) = current() else {
            return;
        };
        let level = record.level().into();
        if let Some(channel) = state.channels.read().unwrap().get(record.target()) {
            channel.log_args(level, *record.args());
            return;
        }
        let mut channels = state.channels.write().unwrap();
        let channel = channels
            .entry(record.target().to_string())
            .or_insert_with(|| Channel::new(record.target(), &state.worker));
        channel.log_args(level, *record.args());
    }

    /// Waits for everything logged so far to be written. Must not be called from a sink.
    fn flush(&self) {
        if let Some(state) = current() {
            state.worker.flush();
        }
    }
}

/// Keeps the logger running. Stops it, delivering everything still queued, when dropped.
pub struct LoggerGuard {
    state: Arc<LoggerState>,
}

impl Drop for LoggerGuard {
    fn drop(&mut self) {
        self.state.worker.stop();
    }
}

/// Builder for configuring and initializing the logger.
pub struct ConfigBuilder {
    log_file: Option<FileSink>,
    no_stdout: bool,
    level: Level,
    queue_limit: Option<usize>,
    repeated: Option<RepeatedMessageConfig>,
    level_store: Option<Arc<dyn LevelStore>>,
    sinks: Vec<Arc<dyn OutputSink>>,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            log_file: None,
            no_stdout: false,
            level: Level::Info,
            queue_limit: None,
            repeated: None,
            level_store: None,
            sinks: Vec::new(),
        }
    }
}

impl ConfigBuilder {
    fn build(self) -> LoggerState {
        let Self {
            log_file,
            no_stdout,
            level,
            queue_limit,
            repeated,
            level_store,
            sinks,
        } = self;

        let configurator = Arc::new(Configurator::new(level));
        if level_store.is_some() {
            configurator.set_level_store(level_store);
        }

        let mut builder = WorkerBuilder::default();
        if let Some(queue_limit) = queue_limit {
            builder = builder.with_queue_limit(queue_limit);
        }
        if let Some(repeated) = repeated {
            builder = builder.with_repeated_messages(repeated);
        }
        let worker = builder.build(configurator);

        if !no_stdout {
            worker.install_default_sinks();
        }
        if let Some(log_file) = log_file {
            worker.add_sink(Arc::new(log_file));
        }
        for sink in sinks {
            worker.add_sink(sink);
        }

        LoggerState {
            worker,
            channels: RwLock::default(),
        }
    }

    /// Sets a log file.
    pub fn with_log_file<P: AsRef<Path>>(self, path: P) -> Result<Self, Error> {
        Ok(Self {
            log_file: Some(FileSink::new(path)?),
            ..self
        })
    }
    /// Maybe sets a log file.
    pub fn maybe_with_log_file<P: AsRef<Path>>(self, path: Option<P>) -> Result<Self, Error> {
        Ok(Self {
            log_file: path.map(FileSink::new).transpose()?,
            ..self
        })
    }
    /// Ignore stdout logging
    pub fn no_stdout(self) -> Self {
        Self {
            no_stdout: true,
            ..self
        }
    }
    /// Dynamically set the stdout flag. Console output is only used when stdout is a terminal.
    pub fn with_stdout(self, yes: bool) -> Self {
        Self {
            no_stdout: !yes,
            ..self
        }
    }
    /// Adds an output, replacing any earlier one of the same name.
    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sinks.push(sink);
        self
    }
    /// Sets the default minimum level of every channel.
    pub fn with_level(self, level: Level) -> Self {
        Self { level, ..self }
    }
    pub fn with_queue_limit(self, queue_limit: usize) -> Self {
        Self {
            queue_limit: Some(queue_limit),
            ..self
        }
    }
    pub fn with_repeated_messages(self, repeated: RepeatedMessageConfig) -> Self {
        Self {
            repeated: Some(repeated),
            ..self
        }
    }
    /// Remembers channel levels set through [`Channel::set_minimum_output_level`].
    pub fn with_level_store<S: LevelStore + 'static>(self, store: S) -> Self {
        Self {
            level_store: Some(Arc::new(store)),
            ..self
        }
    }
    /// Remembers channel levels in a file of `channel=LEVEL` lines.
    pub fn with_level_file<P: AsRef<Path>>(self, path: P) -> Result<Self, Error> {
        Ok(self.with_level_store(FileLevelStore::open(path)?))
    }

    /// Initialize the logger globally, replacing (and stopping) any previous one.
    /// Returns a guard that will flush and shutdown the logger when dropped.
    #[must_use = "LoggerGuard must be kept alive to ensure logging works. Do \"let _guard = logger_config().init_global();\""]
    pub fn init_global(self) -> LoggerGuard {
        let state = Arc::new(self.build());
        state.worker.start();

        INSTALL_LOGGER.call_once(|| {
            if log::set_boxed_logger(Box::new(QuietLogger)).is_ok() {
                // Channels do the filtering.
                log::set_max_level(LevelFilter::Trace);
            }
        });

        let previous = GLOBAL_LOGGER.write().unwrap().replace(state.clone());
        if let Some(previous) = previous {
            previous.worker.stop();
        }
        LoggerGuard { state }
    }
}

/// Returns a default ConfigBuilder for configuring the logger.
pub fn logger_config() -> ConfigBuilder {
    ConfigBuilder::default()
}

/// Stops the global logger, delivering everything already logged.
///
/// Records logged afterwards wait in the queue until [`restart_logging`]. Does
/// nothing if the logger was never initialized or is already stopped.
pub fn shutdown_logging() {
    if let Some(state) = current() {
        state.worker.stop();
    }
}

/// Starts the global logger again after [`shutdown_logging`].
///
/// ```rust
/// use quietlog::{logger_config, restart_logging, shutdown_logging};
///
/// shutdown_logging(); // nothing to stop yet
/// std::fs::remove_file("/tmp/quietlog_restart.log").ok();
/// let _guard = logger_config()
///     .with_log_file("/tmp/quietlog_restart.log")
///     .unwrap()
///     .no_stdout()
///     .init_global();
///
/// log::info!(target: "app", "before");
/// shutdown_logging();
/// shutdown_logging();
/// assert!(std::fs::read_to_string("/tmp/quietlog_restart.log").unwrap().ends_with("before\n"));
/// log::info!(target: "app", "while stopped");
/// restart_logging();
/// restart_logging();
/// quietlog::worker().unwrap().flush();
/// assert!(std::fs::read_to_string("/tmp/quietlog_restart.log").unwrap().ends_with("while stopped\n"));
/// ```
pub fn restart_logging() {
    if let Some(state) = current() {
        state.worker.start();
    }
}

/// Configurator of the global logger, to change channel levels at runtime.
pub fn configurator() -> Option<Arc<Configurator>> {
    current().map(|state| state.worker.configurator().clone())
}

/// Output worker of the global logger.
pub fn worker() -> Option<Arc<OutputWorker>> {
    current().map(|state| state.worker.clone())
}

/// Creates a channel on the global logger, separate from the one backing the `log`
/// target of the same name.
///
/// ```rust
/// use quietlog::{Level, MemoryLevelStore, logger_config};
///
/// let _guard = logger_config()
///     .no_stdout()
///     .with_level_store(MemoryLevelStore::new())
///     .init_global();
///
/// let audio = quietlog::channel("audio").unwrap();
/// assert_eq!(audio.minimum_output_level(), Level::Info);
/// audio.set_minimum_output_level(Level::Warning);
/// // Saved levels are picked up by channels created later.
/// assert_eq!(quietlog::channel("audio").unwrap().minimum_output_level(), Level::Warning);
/// ```
pub fn channel(name: &str) -> Option<Channel> {
    current().map(|state| Channel::new(name, &state.worker))
}

/// Sets and saves the level of the channel backing the `log` target `target`.
pub fn set_channel_level(target: &str, level: Level) {
    let Some(state) = current() else {
        return;
    };
    let mut channels = state.channels.write().unwrap();
    channels
        .entry(target.to_string())
        .or_insert_with(|| Channel::new(target, &state.worker))
        .set_minimum_output_level(level);
}

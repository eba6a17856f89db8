//! # quietlog-core
//! Core of quietlog: named channels, the asynchronous output worker, sinks, and
//! repeated message aggregation.
//!
//! Messages logged through a [`Channel`] are filtered by the channel level, checked
//! for repetition, then queued for the [`OutputWorker`] thread which hands them to
//! every registered [`OutputSink`]. Producers never wait on output.

mod channel;
mod config;
mod configurator;
mod debugger;
mod error;
mod level;
mod repeated;
mod silencer;
mod sink;
mod store;
mod time;
mod worker;

pub use channel::{Channel, ChannelDescriptor, ChannelId};
pub use config::{QUIETLOG_CONFIG, QuietLogConfig};
pub use configurator::Configurator;
pub use debugger::is_debugger_attached;
pub use error::Error;
pub use level::Level;
pub use repeated::{
    HandleResult, PrefixHash, RepeatedMessageConfig, RepeatedMessageManager, prefix_hash,
};
pub use silencer::{ErrorSilencer, SilenceOptions};
pub use sink::{ConsoleSink, DebugViewSink, FileSink, OutputSink};
pub use store::{FileLevelStore, LevelStore, MemoryLevelStore};
pub use time::{LogClock, LogTime, SystemClock};
pub use worker::{
    MessageWriter, OutputWorker, WorkerBuilder, WorkerState, WriteOption, format_header,
};

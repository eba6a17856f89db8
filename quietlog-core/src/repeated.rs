//! Detection and aggregation of repeated log messages.
//!
//! Each message is identified by a fast hash of its first bytes. A message seen twice
//! within the deferral window becomes "repeating": the next few occurrences are still
//! printed, after that they are only counted, and [`RepeatedMessageManager::poll`]
//! later prints one `[Aggregated N times]` summary in their place.
//!
//! Two different messages sharing a prefix hash are treated as the same message, and
//! an aggregated repeat keeps the subsystem and level of the occurrence that started
//! it. Both are accepted approximations.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    thread::{self, ThreadId},
    time::Duration,
};

use crate::{
    config::QUIETLOG_CONFIG,
    level::Level,
    time::{LogClock, SystemClock},
    worker::{MessageWriter, WriteOption},
};

pub type PrefixHash = u32;

/// Tuning of the repeated message detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatedMessageConfig {
    /// Number of leading bytes of a message that identify it.
    pub message_prefix_length: usize,
    /// Target size of the recently seen message map; it is pruned back to this size
    /// once it grows past twice as much.
    pub recent_message_count: usize,
    /// Repeats still printed verbatim once a message is known to repeat.
    pub printed_repeat_count: u32,
    /// Longest gap between two occurrences still counted as the same repeat.
    pub max_deferrable_detection_time: Duration,
    /// Aggregated occurrences after which a summary is printed without waiting for
    /// the repeat to end.
    pub max_deferred_messages: u32,
}

impl Default for RepeatedMessageConfig {
    fn default() -> Self {
        Self {
            message_prefix_length: QUIETLOG_CONFIG.MESSAGE_PREFIX_LENGTH,
            recent_message_count: QUIETLOG_CONFIG.RECENT_MESSAGE_COUNT,
            printed_repeat_count: QUIETLOG_CONFIG.PRINTED_REPEAT_COUNT,
            max_deferrable_detection_time: Duration::from_millis(
                QUIETLOG_CONFIG.MAX_DEFERRABLE_DETECTION_TIME_MS,
            ),
            max_deferred_messages: QUIETLOG_CONFIG.MAX_DEFERRED_MESSAGES,
        }
    }
}

/// Verdict of [`RepeatedMessageManager::handle_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleResult {
    /// Deliver the message as usual.
    Passed,
    /// The message was counted into an aggregate and must not be delivered.
    Aggregated,
}

#[derive(Debug, Clone, Copy)]
struct RecentMessage {
    time_ms: i64,
}

#[derive(Debug, Clone)]
struct RepeatedMessage {
    subsystem: String,
    level: Level,
    text: String,
    last_time_ms: i64,
    printed_count: u32,
    aggregated_count: u32,
}

#[derive(Default)]
struct ManagerState {
    recent: HashMap<PrefixHash, RecentMessage>,
    repeated: HashMap<PrefixHash, RepeatedMessage>,
    message_exceptions: HashSet<PrefixHash>,
    subsystem_exceptions: HashSet<PrefixHash>,
    /// Thread currently printing aggregates from `poll`; its writes pass straight through.
    printing_thread: Option<ThreadId>,
}

/// Marks the current thread as printing aggregates until dropped, even on unwind.
struct PrintingMarker<'a> {
    state: &'a Mutex<ManagerState>,
}

impl<'a> PrintingMarker<'a> {
    fn set(state: &'a Mutex<ManagerState>) -> Self {
        state.lock().unwrap().printing_thread = Some(thread::current().id());
        Self { state }
    }
}

impl Drop for PrintingMarker<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.printing_thread = None;
        }
    }
}

pub struct RepeatedMessageManager {
    config: RepeatedMessageConfig,
    clock: Arc<dyn LogClock>,
    state: Mutex<ManagerState>,
}

/// FNV-1 style hash over at most `prefix_length` bytes of `text`.
///
/// Collisions are tolerated: this only needs to be fast.
pub fn prefix_hash(text: &str, prefix_length: usize) -> PrefixHash {
    let mut hash: u32 = 2_166_136_261;
    for &byte in text.as_bytes().iter().take(prefix_length) {
        hash = hash
            .wrapping_add(hash << 1)
            .wrapping_add(hash << 4)
            .wrapping_add(hash << 7)
            .wrapping_add(hash << 8)
            .wrapping_add(hash << 24);
        hash ^= u32::from(byte);
    }
    hash
}

impl RepeatedMessageManager {
    pub fn new(config: RepeatedMessageConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RepeatedMessageConfig, clock: Arc<dyn LogClock>) -> Self {
        Self {
            config,
            clock,
            state: Mutex::default(),
        }
    }

    pub fn config(&self) -> &RepeatedMessageConfig {
        &self.config
    }

    fn hash(&self, text: &str) -> PrefixHash {
        prefix_hash(text, self.config.message_prefix_length)
    }

    fn window_ms(&self) -> i64 {
        self.config.max_deferrable_detection_time.as_millis() as i64
    }

    /// Classifies one incoming message. See the module documentation.
    pub fn handle_message(&self, subsystem: &str, level: Level, text: &str) -> HandleResult {
        let mut state = self.state.lock().unwrap();

        if state.printing_thread == Some(thread::current().id()) {
            return HandleResult::Passed;
        }

        let prefix_hash = self.hash(text);
        if state.message_exceptions.contains(&prefix_hash) {
            return HandleResult::Passed;
        }
        if state.subsystem_exceptions.contains(&self.hash(subsystem)) {
            return HandleResult::Passed;
        }

        let now_ms = self.clock.now().as_millis();

        if let Some(repeated) = state.repeated.get_mut(&prefix_hash) {
            if now_ms - repeated.last_time_ms >= self.window_ms() {
                // Stale. `poll` prints what is left of it and drops the entry.
                return HandleResult::Passed;
            }
            repeated.last_time_ms = now_ms;

            if repeated.printed_count < self.config.printed_repeat_count {
                repeated.printed_count += 1;
                return HandleResult::Passed;
            }

            repeated.aggregated_count += 1;
            if repeated.aggregated_count >= self.config.max_deferred_messages {
                repeated.text = text.to_string();
            }
            return HandleResult::Aggregated;
        }

        if state.recent.remove(&prefix_hash).is_some() {
            state.repeated.insert(
                prefix_hash,
                RepeatedMessage {
                    subsystem: subsystem.to_string(),
                    level,
                    text: text.to_string(),
                    last_time_ms: now_ms,
                    printed_count: 0,
                    aggregated_count: 0,
                },
            );
        } else {
            state
                .recent
                .insert(prefix_hash, RecentMessage { time_ms: now_ms });
        }
        HandleResult::Passed
    }

    /// Prunes the recent message map and prints the aggregates that are due.
    ///
    /// Aggregates are written through `writer` after the manager lock is released,
    /// since writing reaches into code holding its own locks.
    pub fn poll<W: MessageWriter + ?Sized>(&self, writer: &W) {
        let to_print = {
            let mut state = self.state.lock().unwrap();
            self.prune_recent(&mut state);
            self.collect_due(&mut state)
        };

        for repeated in to_print {
            self.print_aggregate(writer, repeated);
        }
    }

    fn prune_recent(&self, state: &mut ManagerState) {
        let capacity = self.config.recent_message_count;
        if state.recent.len() <= capacity * 2 {
            return;
        }
        let mut by_age: Vec<(PrefixHash, i64)> = state
            .recent
            .iter()
            .map(|(hash, recent)| (*hash, recent.time_ms))
            .collect();
        by_age.sort_unstable_by(|a, b| b.1.cmp(&a.1));
        for (hash, _) in &by_age[capacity..] {
            state.recent.remove(hash);
        }
    }

    fn collect_due(&self, state: &mut ManagerState) -> Vec<RepeatedMessage> {
        let now_ms = self.clock.now().as_millis();
        let window_ms = self.window_ms();
        let max_deferred = self.config.max_deferred_messages;
        let mut to_print = Vec::new();

        state.repeated.retain(|_, repeated| {
            if now_ms - repeated.last_time_ms > window_ms {
                // Only the aggregated part is still unprinted.
                if repeated.aggregated_count > 0 {
                    to_print.push(repeated.clone());
                }
                return false;
            }
            if repeated.aggregated_count >= max_deferred {
                to_print.push(repeated.clone());
                repeated.printed_count += repeated.aggregated_count;
                repeated.aggregated_count = 0;
            }
            true
        });
        to_print
    }

    fn print_aggregate<W: MessageWriter + ?Sized>(&self, writer: &W, repeated: RepeatedMessage) {
        // Prefix and text go out as one message so nothing can land between them.
        let text = format!(
            "[Aggregated {} times] {}",
            repeated.aggregated_count, repeated.text
        );

        let _printing = PrintingMarker::set(&self.state);
        writer.write(
            &repeated.subsystem,
            repeated.level,
            &text,
            false,
            WriteOption::DangerouslyIgnoreQueueLimit,
        );
    }

    pub fn add_message_exception(&self, message_prefix: &str) {
        let hash = self.hash(message_prefix);
        self.state.lock().unwrap().message_exceptions.insert(hash);
    }

    pub fn remove_message_exception(&self, message_prefix: &str) {
        let hash = self.hash(message_prefix);
        self.state.lock().unwrap().message_exceptions.remove(&hash);
    }

    pub fn add_subsystem_exception(&self, subsystem: &str) {
        let hash = self.hash(subsystem);
        self.state.lock().unwrap().subsystem_exceptions.insert(hash);
    }

    pub fn remove_subsystem_exception(&self, subsystem: &str) {
        let hash = self.hash(subsystem);
        self.state.lock().unwrap().subsystem_exceptions.remove(&hash);
    }

    /// Number of messages tracked as recently seen.
    pub fn recent_len(&self) -> usize {
        self.state.lock().unwrap().recent.len()
    }

    /// Number of messages tracked as repeating.
    pub fn repeated_len(&self) -> usize {
        self.state.lock().unwrap().repeated.len()
    }
}

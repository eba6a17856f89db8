use std::{
    cell::RefCell,
    collections::VecDeque,
    io::IsTerminal,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU8, AtomicU64, Ordering},
    },
    thread::JoinHandle,
};

use crossbeam_channel::{Receiver, Sender, bounded, select};

use crate::{
    config::QUIETLOG_CONFIG,
    configurator::Configurator,
    debugger::{is_debugger_attached, log_diagnostic},
    level::Level,
    repeated::{HandleResult, RepeatedMessageConfig, RepeatedMessageManager},
    sink::{ConsoleSink, DebugViewSink, OutputSink},
    time::{LogClock, LogTime, SystemClock},
};

/// Subsystem name of the messages the worker emits about itself.
const WORKER_SUBSYSTEM: &str = "Logging";
const WORKER_THREAD_NAME: &str = "LoggingOutputWorker";
/// Nice increment applied to the worker thread.
#[cfg(target_os = "linux")]
const WORKER_NICE_INCREMENT: libc::c_int = 5;

/// Lowers the scheduling priority of the calling thread. Returns false if the
/// system refused or the platform has no per-thread priority.
#[cfg(target_os = "linux")]
fn lower_thread_priority() -> bool {
    // On Linux, PRIO_PROCESS with id 0 targets the calling thread only.
    // SAFETY: neither call takes a pointer.
    unsafe {
        let nice = libc::getpriority(libc::PRIO_PROCESS, 0);
        libc::setpriority(
            libc::PRIO_PROCESS,
            0,
            (nice + WORKER_NICE_INCREMENT).min(19),
        ) == 0
    }
}

#[cfg(not(target_os = "linux"))]
fn lower_thread_priority() -> bool {
    false
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteOption {
    #[default]
    Default,
    /// Queue the message even if the queue is full. Only for rare, important messages.
    DangerouslyIgnoreQueueLimit,
}

/// Something that accepts log messages for delivery.
pub trait MessageWriter {
    fn write(&self, subsystem: &str, level: Level, text: &str, relogged: bool, option: WriteOption);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => WorkerState::Starting,
            2 => WorkerState::Running,
            3 => WorkerState::Stopping,
            _ => WorkerState::Stopped,
        }
    }
}

struct QueuedMessage {
    subsystem: String,
    level: Level,
    text: String,
    time: LogTime,
    /// Set on flush markers, which carry no text and only signal their waiter.
    flushed: Option<Sender<()>>,
}

#[derive(Default)]
struct WorkQueue {
    messages: VecDeque<QueuedMessage>,
    overrun: u64,
}

/// Collects the aggregate summaries printed by one poll, so that they go out ahead
/// of the batch they were polled for.
struct Summaries<'a> {
    worker: &'a OutputWorker,
    messages: RefCell<Vec<QueuedMessage>>,
}

impl MessageWriter for Summaries<'_> {
    fn write(&self, subsystem: &str, level: Level, text: &str, relogged: bool, _option: WriteOption) {
        if !relogged && self.worker.in_debugger {
            self.worker.write_debug_view(subsystem, level, text);
        }
        self.messages.borrow_mut().push(QueuedMessage {
            subsystem: subsystem.into(),
            level,
            text: text.into(),
            time: self.worker.clock.now(),
            flushed: None,
        });
    }
}

struct WorkerThread {
    handle: JoinHandle<()>,
    // Dropping it disconnects the worker's terminate receiver.
    terminate: Sender<()>,
}

/// `"<timestamp> [LEVEL][subsystem] "`, the header put before every delivered message.
pub fn format_header(time: &LogTime, level: Level, subsystem: &str) -> String {
    format!("{} [{level}][{subsystem}] ", time.render())
}

/// Builder for an [`OutputWorker`].
pub struct WorkerBuilder {
    queue_limit: usize,
    repeated: RepeatedMessageConfig,
    clock: Arc<dyn LogClock>,
    debug_view: Arc<dyn OutputSink>,
    debugger_attached: Option<bool>,
}

impl Default for WorkerBuilder {
    fn default() -> Self {
        Self {
            queue_limit: QUIETLOG_CONFIG.QUEUE_LIMIT,
            repeated: RepeatedMessageConfig::default(),
            clock: Arc::new(SystemClock),
            debug_view: Arc::new(DebugViewSink),
            debugger_attached: None,
        }
    }
}

impl WorkerBuilder {
    /// Sets how many messages may wait in the queue before new ones are dropped.
    pub fn with_queue_limit(self, queue_limit: usize) -> Self {
        Self {
            queue_limit,
            ..self
        }
    }
    pub fn with_repeated_messages(self, repeated: RepeatedMessageConfig) -> Self {
        Self { repeated, ..self }
    }
    pub fn with_clock(self, clock: Arc<dyn LogClock>) -> Self {
        Self { clock, ..self }
    }
    /// Sets the sink written synchronously while a debugger is attached.
    pub fn with_debug_view(self, debug_view: Arc<dyn OutputSink>) -> Self {
        Self { debug_view, ..self }
    }
    /// Overrides debugger detection.
    pub fn with_debugger_attached(self, attached: bool) -> Self {
        Self {
            debugger_attached: Some(attached),
            ..self
        }
    }

    pub fn build(self, configurator: Arc<Configurator>) -> Arc<OutputWorker> {
        let (wake_tx, wake_rx) = bounded(1);
        Arc::new(OutputWorker {
            queue_limit: self.queue_limit,
            configurator,
            repeated: RepeatedMessageManager::with_clock(self.repeated, self.clock.clone()),
            clock: self.clock,
            queue: Mutex::default(),
            drain: Mutex::new(()),
            sinks: Mutex::default(),
            wake_tx,
            wake_rx,
            state: AtomicU8::new(WorkerState::Stopped as u8),
            thread: Mutex::new(None),
            in_debugger: self.debugger_attached.unwrap_or_else(is_debugger_attached),
            debug_view: self.debug_view,
            dropped_total: AtomicU64::new(0),
        })
    }
}

/// Owner of the background thread that delivers log messages to the sinks.
///
/// Producers call [`OutputWorker::write`] from any thread; messages are queued and the
/// worker thread hands them to every sink in order. The queue is bounded: when full,
/// messages are dropped and a single "Lost N log messages" line reports them later.
///
/// Lock order: queue, then the repeated message manager. Sinks run under the sink
/// lock only, never under the queue lock, so a sink may log through this worker.
///
/// Call [`OutputWorker::stop`] before letting go of a started worker. Until then its
/// thread holds a reference to it, and dropping every other handle leaks both.
pub struct OutputWorker {
    queue_limit: usize,
    configurator: Arc<Configurator>,
    repeated: RepeatedMessageManager,
    clock: Arc<dyn LogClock>,
    queue: Mutex<WorkQueue>,
    /// Held for a whole drain cycle, so that drains never interleave.
    drain: Mutex<()>,
    sinks: Mutex<Vec<Arc<dyn OutputSink>>>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
    state: AtomicU8,
    /// Start/stop lock.
    thread: Mutex<Option<WorkerThread>>,
    in_debugger: bool,
    debug_view: Arc<dyn OutputSink>,
    dropped_total: AtomicU64,
}

impl OutputWorker {
    pub fn builder() -> WorkerBuilder {
        WorkerBuilder::default()
    }

    pub fn configurator(&self) -> &Arc<Configurator> {
        &self.configurator
    }

    pub fn repeated_messages(&self) -> &RepeatedMessageManager {
        &self.repeated
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub fn is_debugger_attached(&self) -> bool {
        self.in_debugger
    }

    /// Messages lost to queue overrun since this worker was built.
    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }

    /// Starts the worker thread. Does nothing if it is already running.
    ///
    /// If the thread cannot be spawned the worker stays stopped: writes are still
    /// queued, and delivered by a later start or by [`OutputWorker::stop`].
    ///
    /// The thread keeps the worker alive: a started worker is only dropped, and its
    /// thread only exits, after [`OutputWorker::stop`].
    pub fn start(self: &Arc<Self>) {
        let mut thread = self.thread.lock().unwrap();
        if thread.is_some() {
            return;
        }
        self.set_state(WorkerState::Starting);

        self.configurator.restore_all_channel_log_levels();

        let (terminate_tx, terminate_rx) = bounded::<()>(0);
        let worker = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || worker.run(terminate_rx));
        match spawned {
            Ok(handle) => {
                *thread = Some(WorkerThread {
                    handle,
                    terminate: terminate_tx,
                });
                self.set_state(WorkerState::Running);
            }
            Err(e) => {
                log_diagnostic(&format!("unable to spawn the output worker thread: {e}"));
                self.set_state(WorkerState::Stopped);
            }
        }
    }

    /// Stops the worker thread, then delivers whatever is still queued.
    ///
    /// Safe to call any number of times.
    pub fn stop(&self) {
        let mut thread = self.thread.lock().unwrap();
        if let Some(WorkerThread { handle, terminate }) = thread.take() {
            self.set_state(WorkerState::Stopping);
            drop(terminate);
            if handle.join().is_err() {
                log_diagnostic("output worker thread panicked");
            }
        }
        // Keeps the start/stop lock so nothing queued before stop() is lost or reordered.
        self.process_queued_messages();
        self.set_state(WorkerState::Stopped);
    }

    fn run(&self, terminate: Receiver<()>) {
        if !lower_thread_priority() && cfg!(target_os = "linux") {
            log_diagnostic("unable to lower the output worker thread priority");
        }
        loop {
            select! {
                recv(self.wake_rx) -> _ => self.process_queued_messages(),
                recv(terminate) -> _ => break,
            }
        }
    }

    fn wake(&self) {
        // A full wake channel means a wake-up is already pending.
        self.wake_tx.try_send(()).ok();
    }

    /// Queues a message for the sinks.
    ///
    /// The message may instead be aggregated with earlier identical messages, or
    /// dropped if the queue is full. Never blocks on output and never fails.
    pub fn write(
        &self,
        subsystem: &str,
        level: Level,
        text: &str,
        relogged: bool,
        option: WriteOption,
    ) {
        let mut wake = false;
        {
            let mut queue = self.queue.lock().unwrap();

            if self.repeated.handle_message(subsystem, level, text) == HandleResult::Aggregated {
                return;
            }

            if option != WriteOption::DangerouslyIgnoreQueueLimit
                && queue.messages.len() >= self.queue_limit
            {
                queue.overrun += 1;
                self.dropped_total.fetch_add(1, Ordering::Relaxed);
            } else {
                queue.messages.push_back(QueuedMessage {
                    subsystem: subsystem.into(),
                    level,
                    text: text.into(),
                    time: self.clock.now(),
                    flushed: None,
                });
                // Only the first message needs to wake the thread.
                wake = queue.messages.len() == 1;
            }
        }

        if wake {
            self.wake();
        }

        if !relogged && self.in_debugger {
            self.write_debug_view(subsystem, level, text);
        }
    }

    fn write_debug_view(&self, subsystem: &str, level: Level, text: &str) {
        let header = format_header(&self.clock.now(), level, subsystem);
        self.debug_view.write(level, subsystem, &header, text);
        self.debug_view.flush();
    }

    /// Blocks until every message queued before this call reached the sinks.
    ///
    /// Returns at once if the worker is not running. Must not be called from a sink.
    pub fn flush(&self) {
        let (done_tx, done_rx) = bounded(1);
        {
            // Under the start/stop lock: a concurrent stop() drains the marker.
            let thread = self.thread.lock().unwrap();
            if thread.is_none() {
                log_diagnostic("flush() called while the output worker is not running");
                return;
            }
            self.queue.lock().unwrap().messages.push_back(QueuedMessage {
                subsystem: WORKER_SUBSYSTEM.into(),
                level: Level::Info,
                text: String::new(),
                time: self.clock.now(),
                flushed: Some(done_tx),
            });
            self.wake();
        }
        done_rx.recv().ok();
    }

    /// Runs one drain cycle: delivers the due aggregate summaries, then everything queued.
    pub fn process_queued_messages(&self) {
        let _drain = self.drain.lock().unwrap();

        let summaries = Summaries {
            worker: self,
            messages: RefCell::default(),
        };
        self.repeated.poll(&summaries);
        let summaries = summaries.messages.into_inner();

        let WorkQueue { messages, overrun } = std::mem::take(&mut *self.queue.lock().unwrap());
        if overrun == 0 && messages.is_empty() && summaries.is_empty() {
            return;
        }

        let lost = (overrun > 0).then(|| QueuedMessage {
            subsystem: WORKER_SUBSYSTEM.into(),
            level: Level::Error,
            text: format!(
                "Lost {overrun} log messages due to queue overrun; try to reduce the amount of logging"
            ),
            time: self.clock.now(),
            flushed: None,
        });

        let sinks = self.sinks.lock().unwrap();
        for message in lost.into_iter().chain(summaries).chain(messages) {
            if let Some(done) = message.flushed {
                for sink in sinks.iter() {
                    sink.flush();
                }
                done.send(()).ok();
                continue;
            }
            let header = format_header(&message.time, message.level, &message.subsystem);
            for sink in sinks.iter() {
                sink.write(message.level, &message.subsystem, &header, &message.text);
            }
        }
        for sink in sinks.iter() {
            sink.flush();
        }
    }

    /// Adds a sink, replacing any sink of the same name.
    pub fn add_sink(&self, sink: Arc<dyn OutputSink>) {
        let mut sinks = self.sinks.lock().unwrap();
        sinks.retain(|existing| existing.name() != sink.name());
        sinks.push(sink);
    }

    pub fn remove_sink(&self, name: &str) -> Option<Arc<dyn OutputSink>> {
        let mut sinks = self.sinks.lock().unwrap();
        let position = sinks.iter().position(|sink| sink.name() == name)?;
        Some(sinks.remove(position))
    }

    pub fn sink(&self, name: &str) -> Option<Arc<dyn OutputSink>> {
        self.sinks
            .lock()
            .unwrap()
            .iter()
            .find(|sink| sink.name() == name)
            .cloned()
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.sinks
            .lock()
            .unwrap()
            .iter()
            .map(|sink| sink.name().to_string())
            .collect()
    }

    pub fn disable_all_sinks(&self) {
        self.sinks.lock().unwrap().clear();
    }

    /// Adds the console sink when stdout is a terminal.
    pub fn install_default_sinks(&self) {
        if std::io::stdout().is_terminal() {
            self.add_sink(Arc::new(ConsoleSink));
        }
    }

    pub fn add_repeated_message_exception(&self, message_prefix: &str) {
        self.repeated.add_message_exception(message_prefix);
    }

    pub fn remove_repeated_message_exception(&self, message_prefix: &str) {
        self.repeated.remove_message_exception(message_prefix);
    }

    pub fn add_repeated_message_subsystem_exception(&self, subsystem: &str) {
        self.repeated.add_subsystem_exception(subsystem);
    }

    pub fn remove_repeated_message_subsystem_exception(&self, subsystem: &str) {
        self.repeated.remove_subsystem_exception(subsystem);
    }
}

impl Drop for OutputWorker {
    fn drop(&mut self) {
        // A running thread holds an Arc to the worker, so it was stopped first.
        self.process_queued_messages();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        thread,
        time::Duration,
    };

    use super::*;
    use crate::{
        channel::ChannelDescriptor, sink::testing::RecordingSink, time::testing::ManualClock,
    };

    fn repeated_config() -> RepeatedMessageConfig {
        RepeatedMessageConfig {
            message_prefix_length: 36,
            recent_message_count: 40,
            printed_repeat_count: 3,
            max_deferrable_detection_time: Duration::from_millis(1000),
            max_deferred_messages: 1000,
        }
    }

    fn builder() -> WorkerBuilder {
        WorkerBuilder::default()
            .with_repeated_messages(repeated_config())
            .with_debugger_attached(false)
    }

    fn worker_with(builder: WorkerBuilder) -> (Arc<OutputWorker>, Arc<RecordingSink>) {
        let worker = builder.build(Arc::new(Configurator::default()));
        let sink = RecordingSink::named("record");
        worker.add_sink(sink.clone());
        (worker, sink)
    }

    fn write(worker: &OutputWorker, subsystem: &str, text: &str) {
        worker.write(subsystem, Level::Info, text, false, WriteOption::Default);
    }

    #[test]
    fn test_header_format() {
        let clock = Arc::new(ManualClock::new(1_700_000_000_123));
        let (worker, sink) = worker_with(builder().with_clock(clock));
        worker.write("net", Level::Warning, "link down", false, WriteOption::Default);
        worker.process_queued_messages();
        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].header, "2023-11-14T22:13:20.123 [WARNING][net] ");
        assert_eq!(lines[0].message, "link down");
        assert_eq!(lines[0].level, Level::Warning);
    }

    #[test]
    fn test_queue_overrun_is_reported_once() {
        let (worker, sink) = worker_with(builder().with_queue_limit(3));
        for i in 0..5 {
            write(&worker, "net", &format!("{i} distinct message"));
        }
        assert_eq!(worker.dropped_total(), 2);
        worker.process_queued_messages();
        let lines = sink.lines();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].level, Level::Error);
        assert_eq!(lines[0].subsystem, "Logging");
        assert_eq!(
            lines[0].message,
            "Lost 2 log messages due to queue overrun; try to reduce the amount of logging"
        );
        assert_eq!(
            sink.messages()[1..],
            ["0 distinct message", "1 distinct message", "2 distinct message"]
        );

        // The counter was reset by the drain.
        write(&worker, "net", "after the drain");
        worker.process_queued_messages();
        assert_eq!(sink.messages().last().unwrap(), "after the drain");
        assert_eq!(sink.lines().len(), 5);
    }

    #[test]
    fn test_overrun_reported_with_zero_capacity() {
        let (worker, sink) = worker_with(builder().with_queue_limit(0));
        for i in 0..3 {
            write(&worker, "net", &format!("{i} distinct message"));
        }
        assert_eq!(worker.dropped_total(), 3);
        worker.process_queued_messages();
        assert_eq!(
            sink.messages(),
            vec!["Lost 3 log messages due to queue overrun; try to reduce the amount of logging"]
        );
        worker.process_queued_messages();
        assert_eq!(sink.lines().len(), 1);
    }

    #[test]
    fn test_ignore_queue_limit_option() {
        let (worker, sink) = worker_with(builder().with_queue_limit(1));
        write(&worker, "net", "fills the queue");
        worker.write(
            "net",
            Level::Error,
            "important",
            false,
            WriteOption::DangerouslyIgnoreQueueLimit,
        );
        write(&worker, "net", "dropped");
        assert_eq!(worker.dropped_total(), 1);
        worker.process_queued_messages();
        assert_eq!(
            sink.messages(),
            vec![
                "Lost 1 log messages due to queue overrun; try to reduce the amount of logging",
                "fills the queue",
                "important"
            ]
        );
    }

    #[test]
    fn test_summary_goes_out_before_the_next_batch() {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let (worker, sink) = worker_with(builder().with_clock(clock.clone()));
        for _ in 0..20 {
            clock.advance(5);
            write(&worker, "net", "socket timeout");
        }
        worker.process_queued_messages();
        // First sighting, promotion, then printed_repeat_count more.
        assert_eq!(sink.messages(), vec!["socket timeout"; 5]);

        clock.advance(1001);
        write(&worker, "net", "reconnected");
        worker.process_queued_messages();
        assert_eq!(
            sink.messages()[5..],
            ["[Aggregated 15 times] socket timeout", "reconnected"]
        );
    }

    #[test]
    fn test_summary_is_delivered_when_queue_is_full() {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let (worker, sink) = worker_with(builder().with_clock(clock.clone()).with_queue_limit(6));
        for _ in 0..10 {
            write(&worker, "net", "socket timeout");
        }
        for i in 0..3 {
            write(&worker, "net", &format!("{i} filler"));
        }
        clock.advance(1001);
        worker.process_queued_messages();
        let messages = sink.messages();
        assert_eq!(messages.len(), 8);
        assert_eq!(
            messages[0],
            "Lost 2 log messages due to queue overrun; try to reduce the amount of logging"
        );
        assert_eq!(messages[1], "[Aggregated 5 times] socket timeout");
        assert_eq!(messages.last().unwrap(), "0 filler");
        assert_eq!(worker.dropped_total(), 2);
    }

    #[test]
    fn test_exceptions_pass_through_worker() {
        let (worker, sink) = worker_with(builder());
        worker.add_repeated_message_exception("frame");
        worker.add_repeated_message_subsystem_exception("audio");
        for _ in 0..20 {
            write(&worker, "gpu", "frame");
            write(&worker, "audio", "buffer underrun");
        }
        worker.process_queued_messages();
        assert_eq!(sink.lines().len(), 40);

        worker.remove_repeated_message_exception("frame");
        worker.remove_repeated_message_subsystem_exception("audio");
        for _ in 0..20 {
            write(&worker, "gpu", "frame");
        }
        worker.process_queued_messages();
        assert_eq!(sink.lines().len(), 45);
    }

    #[test]
    fn test_flush_waits_for_delivery() {
        let (worker, sink) = worker_with(builder());
        worker.start();
        for i in 0..200 {
            write(&worker, "net", &format!("message number {i:03}"));
        }
        worker.flush();
        let messages = sink.messages();
        assert_eq!(messages.len(), 200);
        for (i, message) in messages.iter().enumerate() {
            assert_eq!(message, &format!("message number {i:03}"));
        }
        worker.stop();
    }

    #[test]
    fn test_flush_without_thread_returns() {
        let (worker, sink) = worker_with(builder());
        write(&worker, "net", "queued");
        worker.flush();
        assert!(sink.lines().is_empty());
        worker.stop();
        assert_eq!(sink.messages(), vec!["queued"]);
    }

    #[test]
    fn test_start_stop_lifecycle() {
        let (worker, sink) = worker_with(builder());
        assert_eq!(worker.state(), WorkerState::Stopped);
        worker.stop();
        worker.start();
        worker.start();
        assert_eq!(worker.state(), WorkerState::Running);

        write(&worker, "net", "first run");
        worker.stop();
        assert_eq!(worker.state(), WorkerState::Stopped);
        assert_eq!(sink.messages(), vec!["first run"]);
        worker.stop();
        assert_eq!(worker.state(), WorkerState::Stopped);

        // Messages written while stopped wait for the next run.
        write(&worker, "net", "while stopped");
        worker.start();
        write(&worker, "net", "second run");
        worker.flush();
        assert_eq!(
            sink.messages(),
            vec!["first run", "while stopped", "second run"]
        );
        worker.stop();
    }

    #[test]
    fn test_stop_delivers_everything_queued() {
        let (worker, sink) = worker_with(builder());
        worker.start();
        for i in 0..500 {
            write(&worker, "net", &format!("message number {i:03}"));
        }
        worker.stop();
        assert_eq!(sink.lines().len(), 500);
    }

    #[test]
    fn test_concurrent_producers_keep_their_order() {
        let (worker, sink) = worker_with(builder().with_queue_limit(100_000));
        worker.start();
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let worker = worker.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        write(&worker, &format!("thread {t}"), &format!("thread {t} message {i:03}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        worker.flush();
        let lines = sink.lines();
        assert_eq!(lines.len(), 800);
        for t in 0..8 {
            let subsystem = format!("thread {t}");
            let own: Vec<_> = lines
                .iter()
                .filter(|line| line.subsystem == subsystem)
                .map(|line| line.message.clone())
                .collect();
            let expected: Vec<_> = (0..100)
                .map(|i| format!("thread {t} message {i:03}"))
                .collect();
            assert_eq!(own, expected);
        }
        worker.stop();
    }

    /// Logs an echo of every line it receives back into the worker.
    struct EchoSink {
        worker: Mutex<Option<Arc<OutputWorker>>>,
        seen: Mutex<Vec<String>>,
    }

    impl OutputSink for EchoSink {
        fn name(&self) -> &str {
            "echo"
        }

        fn write(&self, _level: Level, _subsystem: &str, _header: &str, message: &str) {
            self.seen.lock().unwrap().push(message.to_string());
            if message.starts_with("echo of") {
                return;
            }
            if let Some(worker) = &*self.worker.lock().unwrap() {
                worker.write("echo", Level::Info, &format!("echo of {message}"), false, WriteOption::Default);
            }
        }
    }

    #[test]
    fn test_sink_can_log_back_into_the_worker() {
        let worker = builder().build(Arc::new(Configurator::default()));
        let sink = Arc::new(EchoSink {
            worker: Mutex::new(Some(worker.clone())),
            seen: Mutex::default(),
        });
        worker.add_sink(sink.clone());
        worker.start();
        write(&worker, "net", "hello");
        // The first flush delivers "hello", whose echo is queued during that drain.
        worker.flush();
        worker.flush();
        assert_eq!(*sink.seen.lock().unwrap(), vec!["hello", "echo of hello"]);
        worker.stop();
        // Breaks the worker -> sink -> worker cycle.
        sink.worker.lock().unwrap().take();
    }

    #[test]
    fn test_dropping_a_stopped_worker_delivers_the_queue() {
        let (worker, sink) = worker_with(builder());
        worker.start();
        worker.stop();
        write(&worker, "net", "written after stop");
        assert!(sink.lines().is_empty());
        drop(worker);
        assert_eq!(sink.messages(), vec!["written after stop"]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_lower_thread_priority_only_affects_calling_thread() {
        let own = unsafe { libc::getpriority(libc::PRIO_PROCESS, 0) };
        let (before, after) = thread::spawn(|| {
            let before = unsafe { libc::getpriority(libc::PRIO_PROCESS, 0) };
            assert!(lower_thread_priority());
            (before, unsafe { libc::getpriority(libc::PRIO_PROCESS, 0) })
        })
        .join()
        .unwrap();
        assert_eq!(after, (before + WORKER_NICE_INCREMENT).min(19));
        assert_eq!(unsafe { libc::getpriority(libc::PRIO_PROCESS, 0) }, own);
    }

    #[test]
    fn test_sink_registration() {
        let (worker, first) = worker_with(builder());
        let other = RecordingSink::named("other");
        worker.add_sink(other.clone());
        let replacement = RecordingSink::named("record");
        worker.add_sink(replacement.clone());
        assert_eq!(worker.sink_names(), vec!["other", "record"]);
        assert!(worker.sink("record").is_some());
        assert!(worker.sink("missing").is_none());

        write(&worker, "net", "to both");
        worker.process_queued_messages();
        assert!(first.lines().is_empty());
        assert_eq!(replacement.messages(), vec!["to both"]);
        assert_eq!(other.messages(), vec!["to both"]);

        assert!(worker.remove_sink("other").is_some());
        assert!(worker.remove_sink("other").is_none());
        worker.disable_all_sinks();
        assert!(worker.sink_names().is_empty());
        write(&worker, "net", "to nobody");
        worker.process_queued_messages();
        assert_eq!(replacement.lines().len(), 1);
    }

    #[test]
    fn test_debugger_gets_lines_immediately() {
        let debug_view = RecordingSink::named("DbgView");
        let (worker, sink) = worker_with(
            builder()
                .with_debugger_attached(true)
                .with_debug_view(debug_view.clone()),
        );
        assert!(worker.is_debugger_attached());
        write(&worker, "net", "seen at once");
        worker.write("net", Level::Info, "forwarded line", true, WriteOption::Default);
        assert_eq!(debug_view.messages(), vec!["seen at once"]);
        assert!(sink.lines().is_empty());
        worker.process_queued_messages();
        assert_eq!(sink.messages(), vec!["seen at once", "forwarded line"]);
    }

    #[test]
    fn test_start_restores_channel_levels() {
        let (worker, _sink) = worker_with(builder());
        let descriptor = Arc::new(ChannelDescriptor::new("net", Level::Trace));
        worker.configurator().register(descriptor.clone());
        descriptor.store_level(Level::Error);
        worker.start();
        assert_eq!(descriptor.level(), Level::Debug);
        worker.stop();
    }
}

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
    sync::Mutex,
};

use crate::{error::Error, level::Level};

/// An output destination fed by the output worker.
///
/// Sinks are identified by [`OutputSink::name`]; the worker keeps at most one sink per
/// name. `write` is only ever called from one thread at a time, with the header
/// (`"<timestamp> [LEVEL][subsystem] "`) and the raw message passed separately.
pub trait OutputSink: Send + Sync {
    fn name(&self) -> &str;
    fn write(&self, level: Level, subsystem: &str, header: &str, message: &str);
    fn flush(&self) {}
}

/// Prints lines to stdout, header colored by level.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn name(&self) -> &str {
        "Console"
    }

    fn write(&self, level: Level, _subsystem: &str, header: &str, message: &str) {
        println!("{}{message}", level.paint(header));
    }

    fn flush(&self) {
        std::io::stdout().flush().ok();
    }
}

/// Appends lines to a file. The file is created if it does not exist.
pub struct FileSink {
    file: Mutex<BufWriter<File>>,
}

impl FileSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::options().create(true).append(true).open(&path)?;
        Ok(Self {
            file: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl OutputSink for FileSink {
    fn name(&self) -> &str {
        "File"
    }

    fn write(&self, _level: Level, _subsystem: &str, header: &str, message: &str) {
        let mut file = self.file.lock().unwrap();
        writeln!(file, "{header}{message}").ok();
    }

    fn flush(&self) {
        self.file.lock().unwrap().flush().ok();
    }
}

/// Writes each line to stderr and flushes it at once, so it shows up while the
/// process sits on a breakpoint.
#[derive(Debug, Default)]
pub struct DebugViewSink;

impl OutputSink for DebugViewSink {
    fn name(&self) -> &str {
        "DbgView"
    }

    fn write(&self, _level: Level, _subsystem: &str, header: &str, message: &str) {
        let mut stderr = std::io::stderr().lock();
        writeln!(stderr, "{header}{message}").ok();
        stderr.flush().ok();
    }
}


#[test]
fn test_file_sink_appends() {
    let path = "/tmp/quietlog_test_file_sink.log";
    std::fs::remove_file(path).ok();
    let sink = FileSink::new(path).unwrap();
    sink.write(Level::Info, "net", "[INFO][net] ", "Hello, world!");
    sink.write(Level::Error, "net", "[ERROR][net] ", "rust is awesome !");
    sink.flush();
    drop(sink);
    let sink = FileSink::new(path).unwrap();
    sink.write(Level::Debug, "io", "[DEBUG][io] ", "test");
    sink.flush();
    assert_eq!(
        std::fs::read_to_string(path).unwrap(),
        "[INFO][net] Hello, world!\n[ERROR][net] rust is awesome !\n[DEBUG][io] test\n"
    );
}

#[test]
fn test_console_and_debug_view_sinks() {
    let console = ConsoleSink;
    console.write(Level::Warning, "net", "[WARNING][net] ", "to stdout");
    console.flush();
    let debug_view = DebugViewSink;
    debug_view.write(Level::Warning, "net", "[WARNING][net] ", "to stderr");
    assert_eq!(console.name(), "Console");
    assert_eq!(debug_view.name(), "DbgView");
}

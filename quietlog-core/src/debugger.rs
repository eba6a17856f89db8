/// Returns true when a tracer (debugger) is attached to this process.
#[cfg(target_os = "linux")]
pub fn is_debugger_attached() -> bool {
    std::fs::read_to_string("/proc/self/status")
        .map(|status| tracer_pid(&status).is_some_and(|pid| pid != 0))
        .unwrap_or(false)
}

/// Returns true when a tracer (debugger) is attached to this process.
#[cfg(not(target_os = "linux"))]
pub fn is_debugger_attached() -> bool {
    false
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn tracer_pid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("TracerPid:"))
        .and_then(|pid| pid.trim().parse().ok())
}

/// Reports a failure of the logging system itself.
///
/// The logging system cannot log its own failures through the queue, so these go
/// straight to stderr.
pub(crate) fn log_diagnostic(message: &str) {
    eprintln!("[quietlog] {message}");
}

#[test]
fn test_tracer_pid_parsing() {
    let status = "Name:\tcat\nState:\tR (running)\nTracerPid:\t4242\nUid:\t0\n";
    assert_eq!(tracer_pid(status), Some(4242));
    assert_eq!(tracer_pid("TracerPid:\t0\n"), Some(0));
    assert_eq!(tracer_pid("Name:\tcat\n"), None);
}

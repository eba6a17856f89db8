use quietlog::logger_config;

fn main() {
    let path = "/tmp/quietlog_example_repeated.log";
    std::fs::remove_file(path).ok();

    let _guard = logger_config()
        .with_log_file(path)
        .unwrap()
        .init_global();

    // Each thread floods the same warning; the outputs only see a handful of them.
    let handles: Vec<_> = (0..4)
        .map(|i| {
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    log::warn!(target: "net", "connection refused by peer");
                }
                log::info!(target: "net", "thread {i} gave up");
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    drop(_guard);

    let content = std::fs::read_to_string(path).unwrap();
    println!("\n--- Aggregation Summary ---");
    println!("Messages logged: 4004");
    println!("Lines written to {path}: {}", content.lines().count());
    for line in content.lines().filter(|line| line.contains("[Aggregated")) {
        println!("  {line}");
    }
}

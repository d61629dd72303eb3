//! Logging initialization in each format. Only the first `init` in a process
//! installs a subscriber; later calls must be harmless no-ops.

use agquota::core::logging::{self, LogFormat, LogLevel, LogSettings};

#[test]
fn init_every_format_without_panicking() {
    for format in [LogFormat::Human, LogFormat::Compact, LogFormat::Json] {
        logging::init(&LogSettings {
            level: LogLevel::Debug,
            format,
            file: None,
        });
    }
    tracing::info!("logging initialized");
}

#[test]
fn unwritable_log_file_is_not_opened() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing-dir").join("agquota.log");

    assert!(logging::open_log_file(&path).is_none());
    assert!(!path.exists());
}

#[test]
fn writable_log_file_is_created_and_appended() {
    use std::io::Write;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agquota.log");
    std::fs::write(&path, "first\n").unwrap();

    let mut file = logging::open_log_file(&path).unwrap();
    writeln!(file, "second").unwrap();
    drop(file);

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! End-to-end scenarios from the logging core's behavioral contract: basic
//! line formatting, level filtering, multi-line splitting, prefix
//! configuration, and flush ordering across threads. Every test is
//! `#[serial]`d because the runtime is one process-wide value.

use libdd_logger::level::Level;
use libdd_logger::registry::{ConfigItem, Logger};
use libdd_logger::{log_info, log_output};
use serial_test::serial;
use std::fs;
use std::io::Read;
use std::sync::Arc;
use tempfile::NamedTempFile;

fn read_all(path: &std::path::Path) -> String {
    let mut s = String::new();
    fs::File::open(path).unwrap().read_to_string(&mut s).unwrap();
    s
}

/// Basic line: one `output`-level record from the main thread, checked
/// against the §4.C grammar.
#[test]
#[serial]
fn basic_line_matches_output_grammar() {
    let file = NamedTempFile::new().expect("tempfile");
    let path = file.path().to_str().unwrap().to_string();
    libdd_logger::init("prog", &path).expect("init");
    libdd_logger::remember_identity("prog", &path);

    let logger: Arc<Logger> = Logger::new("t", Level::Output);
    libdd_logger::register(logger.clone());

    log_output!(&logger, "hello");
    libdd_logger::flush().expect("flush");
    libdd_logger::finalize().expect("finalize");

    let contents = read_all(file.path());
    let line = contents.lines().next().expect("at least one line");
    assert!(line.starts_with('O'), "line: {line:?}");
    assert!(line.contains("|t|hello"), "line: {line:?}");
    let fields: Vec<&str> = line.splitn(6, '|').collect();
    assert_eq!(fields.len(), 6);
}

/// Level filter: a record below the logger's threshold produces no output.
#[test]
#[serial]
fn level_below_threshold_produces_no_output() {
    let file = NamedTempFile::new().expect("tempfile");
    let path = file.path().to_str().unwrap().to_string();
    libdd_logger::init("prog", &path).expect("init");
    libdd_logger::remember_identity("prog", &path);

    let logger: Arc<Logger> = Logger::new("t2", Level::Warning);
    libdd_logger::register(logger.clone());

    log_info!(&logger, "x");
    libdd_logger::flush().expect("flush");
    libdd_logger::finalize().expect("finalize");

    let contents = read_all(file.path());
    assert!(contents.is_empty(), "expected no output, got: {contents:?}");
}

/// Multi-line: a message with embedded `\n` becomes N lines sharing one
/// metadata prefix.
#[test]
#[serial]
fn multiline_message_splits_into_matching_lines() {
    let file = NamedTempFile::new().expect("tempfile");
    let path = file.path().to_str().unwrap().to_string();
    libdd_logger::init("prog", &path).expect("init");
    libdd_logger::remember_identity("prog", &path);

    let logger: Arc<Logger> = Logger::new("t3", Level::Output);
    libdd_logger::register(logger.clone());

    log_output!(&logger, "a\nb\nc");
    libdd_logger::flush().expect("flush");
    libdd_logger::finalize().expect("finalize");

    let contents = read_all(file.path());
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].ends_with("|a"));
    assert!(lines[1].ends_with("|b"));
    assert!(lines[2].ends_with("|c"));
    let prefix = |l: &str| l.rsplit_once('|').unwrap().0.to_string();
    assert_eq!(prefix(lines[0]), prefix(lines[1]));
    assert_eq!(prefix(lines[1]), prefix(lines[2]));
}

/// Prefix configuration: later, more specific prefixes win over earlier,
/// broader ones.
#[test]
#[serial]
fn prefix_configuration_overrides_in_order() {
    let a: Arc<Logger> = Logger::new("pfx.a", Level::Lowest);
    let ab: Arc<Logger> = Logger::new("pfx.a.b", Level::Lowest);
    let ac: Arc<Logger> = Logger::new("pfx.a.c", Level::Lowest);
    libdd_logger::register(a.clone());
    libdd_logger::register(ab.clone());
    libdd_logger::register(ac.clone());

    libdd_logger::cfg_registered(&[
        ConfigItem::new("pfx", Level::Lowest),
        ConfigItem::new("pfx.a", Level::Output),
        ConfigItem::new("pfx.a.b", Level::Warning),
    ]);

    assert_eq!(a.level(), Level::Output);
    assert_eq!(ab.level(), Level::Warning);
    assert_eq!(ac.level(), Level::Output);

    libdd_logger::unregister(&a);
    libdd_logger::unregister(&ab);
    libdd_logger::unregister(&ac);
}

/// Flush ordering: three threads each emit 1000 records, then `flush()`
/// returns only once every record has reached the sink.
#[test]
#[serial]
fn flush_ordering_across_threads() {
    let file = NamedTempFile::new().expect("tempfile");
    let path = file.path().to_str().unwrap().to_string();
    libdd_logger::init("prog", &path).expect("init");
    libdd_logger::remember_identity("prog", &path);

    let logger: Arc<Logger> = Logger::new("flush.test", Level::Lowest);
    libdd_logger::register(logger.clone());

    const PER_THREAD: usize = 1000;
    let handles: Vec<_> = (0..3)
        .map(|_| {
            let logger = logger.clone();
            std::thread::spawn(move || {
                for i in 0..PER_THREAD {
                    log_output!(&logger, "record {}", i);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    libdd_logger::flush().expect("flush");
    let contents = read_all(file.path());
    assert_eq!(contents.lines().count(), 3 * PER_THREAD);

    libdd_logger::finalize().expect("finalize");
}

/// Idempotence: calling `flush()` twice in a row is equivalent to once.
#[test]
#[serial]
fn double_flush_is_idempotent() {
    let file = NamedTempFile::new().expect("tempfile");
    let path = file.path().to_str().unwrap().to_string();
    libdd_logger::init("prog", &path).expect("init");
    libdd_logger::remember_identity("prog", &path);

    assert!(libdd_logger::flush().is_ok());
    assert!(libdd_logger::flush().is_ok());

    libdd_logger::finalize().expect("finalize");
}

/// A thread that logged against one runtime, then sees that runtime
/// finalized and a fresh one initialized, must pick up the new runtime's
/// queues rather than keep sending into the old, now-disconnected ones.
#[test]
#[serial]
fn thread_local_state_survives_finalize_and_reinit() {
    let first = NamedTempFile::new().expect("tempfile");
    let first_path = first.path().to_str().unwrap().to_string();
    libdd_logger::init("prog", &first_path).expect("init");
    libdd_logger::remember_identity("prog", &first_path);

    let logger: Arc<Logger> = Logger::new("reinit.test", Level::Output);
    libdd_logger::register(logger.clone());

    log_output!(&logger, "first run");
    libdd_logger::flush().expect("flush");
    libdd_logger::finalize().expect("finalize");

    let second = NamedTempFile::new().expect("tempfile");
    let second_path = second.path().to_str().unwrap().to_string();
    libdd_logger::init("prog", &second_path).expect("init");
    libdd_logger::remember_identity("prog", &second_path);

    log_output!(&logger, "second run");
    libdd_logger::flush().expect("flush");
    libdd_logger::finalize().expect("finalize");

    let second_contents = read_all(second.path());
    assert!(
        second_contents.contains("second run"),
        "expected the post-reinit record in the new sink, got: {second_contents:?}"
    );

    libdd_logger::unregister(&logger);
}

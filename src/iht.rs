// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The internal handler thread (IHT): the sole consumer of log records.
//! Decodes, formats, and writes them to the configured sink, multiplexing
//! the data queue, the control queue, and (on Linux) a signal-relay channel
//! behind a single `crossbeam_channel::Select`.

use crate::config::RuntimeConfig;
use crate::error::Error;
use crate::level::Level;
use crate::lifecycle::Sink;
use crate::protocol::{ControlReply, ControlRequest};
use crate::queue::{ControlQueueReceiver, DataQueueReceiver, SignalQueue, SignalQueueReceiver};
use crate::record::Record;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;

/// The IHT's own output handle: either a locked standard stream or an
/// opened file. Only the IHT ever writes to this; it is closed (`Drop`)
/// when the IHT exits.
enum OutputSink {
    Stdout(io::Stdout),
    Stderr(io::Stderr),
    File(File),
}

impl OutputSink {
    fn open(sink: &Sink) -> io::Result<OutputSink> {
        Ok(match sink {
            Sink::Stdout => OutputSink::Stdout(io::stdout()),
            Sink::Stderr => OutputSink::Stderr(io::stderr()),
            Sink::Path(path) => OutputSink::File(
                OpenOptions::new()
                    .write(true)
                    .create(true)
                    .append(true)
                    .mode(0o644)
                    .open(path)?,
            ),
        })
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        match self {
            OutputSink::Stdout(s) => s.lock().write_all(line.as_bytes()),
            OutputSink::Stderr(s) => s.lock().write_all(line.as_bytes()),
            OutputSink::File(f) => f.write_all(line.as_bytes()),
        }
    }

    /// `fdatasync`-equivalent. `EROFS`/`EINVAL` (sync unsupported on this
    /// fd, e.g. a tty) are swallowed rather than propagated.
    fn sync(&mut self) -> io::Result<()> {
        let result = match self {
            OutputSink::Stdout(s) => s.lock().flush().and_then(|_| sync_fd(libc::STDOUT_FILENO)),
            OutputSink::Stderr(s) => s.lock().flush().and_then(|_| sync_fd(libc::STDERR_FILENO)),
            OutputSink::File(f) => f.sync_data(),
        };
        match result {
            Ok(()) => Ok(()),
            Err(e)
                if e.raw_os_error() == Some(libc::EROFS)
                    || e.raw_os_error() == Some(libc::EINVAL) =>
            {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn sync_fd(fd: i32) -> io::Result<()> {
    // SAFETY: `fd` is one of the process's standard fds, always valid.
    let rc = unsafe { libc::fdatasync(fd) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Reduces `path` to its basename by scanning from the end for the last
/// `/`, rather than delegating to `Path::file_name`, which has its own
/// trailing-slash and Windows-separator quirks not wanted here.
fn basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Formats one [`Record`] into one or more newline-terminated output lines
/// (more than one when the message contains `\n`), per the §4.C grammar:
/// `<L>|<YYYYMMDD>T<HHMMSS>.<nnnnnnnnn>|<pid>.<tid>=<rank>:<progname>|<file>:<line>@<func>|<logger>|<msg>`
fn format_lines(record: &Record, pid: u32, progname: &str) -> Vec<String> {
    use chrono::{Local, TimeZone};

    let local = Local
        .timestamp_opt(record.timestamp.secs, record.timestamp.nanos)
        .single()
        .unwrap_or_else(Local::now);
    let date = local.format("%Y%m%dT%H%M%S");
    let file = basename(&record.filename);

    let tid_part = match record.tid {
        Some(tid) => format!("{pid:05}.{tid:05}="),
        None => format!("{pid:05}."),
    };

    record
        .message
        .split('\n')
        .map(|line| {
            format!(
                "{level}|{date}.{nanos:09}|{tid_part}{rank:05}:{progname}|{file}:{lineno}@{func}|{logger}|{msg}\n",
                level = record.level.as_char(),
                nanos = record.timestamp.nanos,
                rank = record.rank,
                lineno = record.line,
                func = record.funcname,
                logger = record.loggername,
                msg = line,
            )
        })
        .collect()
}

fn own_rank() -> u16 {
    0
}

/// Formats and logs one record locally, bypassing the queue entirely, used
/// only for records the IHT originates about itself (the signal-triggered
/// CRITICAL record). Never recurses through the data queue.
fn log_locally(
    sink: &mut OutputSink,
    pid: u32,
    progname: &str,
    level: Level,
    message: impl Into<String>,
) {
    let record = Record::new(level, None, own_rank(), 0, "iht", "signal_relay", "bxilog.iht", message);
    for line in format_lines(&record, pid, progname) {
        let _ = write_with_fallback(sink, &line);
    }
    let _ = sink.sync();
}

/// Writes `line`, falling back to a stderr warning and a stderr retry if
/// the primary write fails or writes zero bytes.
fn write_with_fallback(sink: &mut OutputSink, line: &str) -> io::Result<()> {
    match sink.write_line(line) {
        Ok(()) => Ok(()),
        Err(_) => {
            eprintln!("bxilog: write to sink failed, falling back to stderr");
            eprint!("{line}");
            Ok(())
        }
    }
}

/// Drains every record currently queued, writing and formatting each.
fn drain(data_rx: &DataQueueReceiver, sink: &mut OutputSink, pid: u32, progname: &str) {
    while let Ok(record) = data_rx.receiver().try_recv() {
        for line in format_lines(&record, pid, progname) {
            let _ = write_with_fallback(sink, &line);
        }
    }
}

/// Runs the IHT main loop to completion: replies `Ready`, then multiplexes
/// the data queue, the control queue, and (on Linux) the signal-relay
/// channel until an `Exit` request arrives. Returns the accumulated error
/// chain if the loop had to abort early.
pub fn run(
    progname: String,
    pid: u32,
    sink: Sink,
    config: RuntimeConfig,
    data_rx: DataQueueReceiver,
    control_rx: ControlQueueReceiver,
) -> crate::error::Result<()> {
    let mut out = OutputSink::open(&sink).map_err(Error::SystemError)?;

    #[cfg(target_os = "linux")]
    let signal_rx = spawn_signal_relay();
    #[cfg(not(target_os = "linux"))]
    let signal_rx: Option<SignalQueueReceiver> = None;

    // Reply to the startup Ready request before entering the main loop, so
    // `init()` unblocks only once the sink is actually open and the signal
    // relay (if any) is running.
    if let Ok(envelope) = control_rx.receiver().recv() {
        if envelope.request == ControlRequest::Ready {
            let _ = envelope.reply_tx.send(ControlReply::Ready);
        } else {
            // Unexpected first message; handle it through the normal path
            // below so nothing is silently dropped.
            if let Err(e) = handle_control(envelope, &data_rx, &mut out, pid, &progname) {
                return Err(e);
            }
        }
    }

    // Every recoverable failure is folded into this chain via `Error::chain`
    // rather than counted separately, so `chain_depth()` reflects the actual
    // `source()` walk the quit policy is documented to use.
    let mut last_error: Option<Error> = None;
    let record_failure = |last_error: &mut Option<Error>, e: Error| -> crate::error::Result<()> {
        let chained = match last_error.take() {
            Some(prev) => prev.chain(e.to_string()),
            None => e,
        };
        let depth = chained.chain_depth();
        if depth > config.max_error_chain {
            return Err(Error::TooManyErrors {
                last: Box::new(chained),
            });
        }
        *last_error = Some(chained);
        Ok(())
    };

    loop {
        match select_once(&data_rx, &control_rx, signal_rx.as_ref(), config.poll_timeout) {
            LoopEvent::Timeout => {
                drain(&data_rx, &mut out, pid, &progname);
                if let Err(e) = out.sync().map_err(Error::SystemError) {
                    record_failure(&mut last_error, e)?;
                }
            }
            LoopEvent::Data(record) => {
                for line in format_lines(&record, pid, &progname) {
                    if let Err(e) = write_with_fallback(&mut out, &line).map_err(Error::SystemError) {
                        record_failure(&mut last_error, e)?;
                    }
                }
            }
            LoopEvent::Control(envelope) => {
                let is_exit = envelope.request == ControlRequest::Exit;
                if let Err(e) = handle_control(envelope, &data_rx, &mut out, pid, &progname) {
                    record_failure(&mut last_error, e)?;
                }
                if is_exit {
                    return Ok(());
                }
            }
            LoopEvent::Signal(event) => {
                drain(&data_rx, &mut out, pid, &progname);
                let desc = crate::signals::describe_signal(event.signum, event.info);
                log_locally(&mut out, pid, &progname, Level::Critical, desc);
                let _ = out.sync();
                crate::signals::reraise_with_default_disposition(event.signum);
            }
            LoopEvent::Disconnected => return Ok(()),
        }
    }
}

enum LoopEvent {
    Timeout,
    Data(Record),
    Control(crate::queue::ControlEnvelope),
    Signal(crate::queue::SignalEvent),
    Disconnected,
}

fn select_once(
    data_rx: &DataQueueReceiver,
    control_rx: &ControlQueueReceiver,
    signal_rx: Option<&SignalQueueReceiver>,
    timeout: std::time::Duration,
) -> LoopEvent {
    use crossbeam_channel::Select;

    let mut select = Select::new();
    let data_idx = select.recv(data_rx.receiver());
    let control_idx = select.recv(control_rx.receiver());
    let signal_idx = signal_rx.map(|rx| select.recv(rx.receiver()));

    match select.select_timeout(timeout) {
        Err(_) => LoopEvent::Timeout,
        Ok(op) => {
            let idx = op.index();
            if idx == data_idx {
                match op.recv(data_rx.receiver()) {
                    Ok(record) => LoopEvent::Data(record),
                    Err(_) => LoopEvent::Disconnected,
                }
            } else if idx == control_idx {
                match op.recv(control_rx.receiver()) {
                    Ok(envelope) => LoopEvent::Control(envelope),
                    Err(_) => LoopEvent::Disconnected,
                }
            } else if Some(idx) == signal_idx {
                match op.recv(signal_rx.expect("signal_idx implies signal_rx").receiver()) {
                    Ok(event) => LoopEvent::Signal(event),
                    Err(_) => LoopEvent::Timeout,
                }
            } else {
                LoopEvent::Timeout
            }
        }
    }
}

fn handle_control(
    envelope: crate::queue::ControlEnvelope,
    data_rx: &DataQueueReceiver,
    out: &mut OutputSink,
    pid: u32,
    progname: &str,
) -> crate::error::Result<()> {
    match envelope.request {
        ControlRequest::Ready => {
            let _ = envelope.reply_tx.send(ControlReply::Ready);
            Ok(())
        }
        ControlRequest::Flush => {
            drain(data_rx, out, pid, progname);
            out.sync().map_err(Error::SystemError)?;
            let _ = envelope.reply_tx.send(ControlReply::Flushed);
            Ok(())
        }
        ControlRequest::Exit => {
            drain(data_rx, out, pid, progname);
            let _ = out.sync();
            Ok(())
        }
    }
}

#[cfg(target_os = "linux")]
fn spawn_signal_relay() -> Option<SignalQueueReceiver> {
    let fd = crate::signals::open_iht_signalfd().ok()?;
    let (tx, rx) = SignalQueue::bounded_one();
    std::thread::Builder::new()
        .name("bxilog-sigrelay".to_string())
        .spawn(move || crate::signals::run_signal_relay(fd, tx))
        .ok()?;
    Some(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Timestamp;

    fn sample_record(message: &str) -> Record {
        Record {
            level: Level::Output,
            timestamp: Timestamp { secs: 1_700_000_000, nanos: 123_456_789 },
            tid: Some(4242),
            rank: 7,
            line: 99,
            filename: "/src/main.rs".to_string(),
            funcname: "main".to_string(),
            loggername: "t".to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn basename_strips_directories() {
        assert_eq!(basename("/a/b/c.rs"), "c.rs");
        assert_eq!(basename("c.rs"), "c.rs");
        assert_eq!(basename("/a/b/"), "");
    }

    #[test]
    fn format_lines_matches_grammar() {
        let record = sample_record("hello");
        let lines = format_lines(&record, 123, "prog");
        assert_eq!(lines.len(), 1);
        let re = regex_lite_check(&lines[0]);
        assert!(re, "line did not match grammar: {:?}", lines[0]);
        assert!(lines[0].contains("@main|t|hello"));
        assert!(lines[0].starts_with('O'));
    }

    #[test]
    fn multi_line_message_splits_with_shared_metadata() {
        let record = sample_record("a\nb\nc");
        let lines = format_lines(&record, 1, "prog");
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("|a\n"));
        assert!(lines[1].ends_with("|b\n"));
        assert!(lines[2].ends_with("|c\n"));
        let prefixes: Vec<&str> = lines
            .iter()
            .map(|l| l.rsplit_once('|').map(|(p, _)| p).unwrap_or(l))
            .collect();
        assert_eq!(prefixes[0], prefixes[1]);
        assert_eq!(prefixes[1], prefixes[2]);
    }

    #[test]
    fn missing_tid_omits_tid_field() {
        let mut record = sample_record("x");
        record.tid = None;
        let lines = format_lines(&record, 1, "prog");
        assert!(!lines[0].contains('='));
    }

    /// Minimal hand-rolled grammar check (avoids pulling in `regex` as a
    /// runtime dependency just for this one assertion).
    fn regex_lite_check(line: &str) -> bool {
        let mut parts = line.trim_end_matches('\n').splitn(6, '|');
        let level = parts.next().unwrap_or("");
        let ts = parts.next().unwrap_or("");
        let who = parts.next().unwrap_or("");
        let loc = parts.next().unwrap_or("");
        let logger = parts.next().unwrap_or("");
        let _msg = parts.next().unwrap_or("");
        level.len() == 1
            && ts.contains('T')
            && who.contains(':')
            && loc.contains('@')
            && !logger.is_empty()
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The global lifecycle finite state machine: `init`/`finalize`/`flush`,
//! plus `fork()` safety via `libc::pthread_atfork`. Modeled as a single
//! process-wide `Runtime` value behind a `Mutex`, keeping the collector
//! state behind one `OnceLock`-guarded value rather than a scattering of
//! independent globals.

use crate::config::RuntimeConfig;
use crate::error::Error;
use crate::iht;
use crate::protocol::{ControlReply, ControlRequest};
use crate::queue::{ControlQueue, DataQueue};
use crate::registry::Logger;
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Mutex, Once, OnceLock};
use std::thread::JoinHandle;

/// The global lifecycle state, observable via a best-effort relaxed load;
/// racing the init mutex is tolerated since this is only used for an
/// illegal-state check, not to gate any actual mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    Unset = 0,
    Initializing = 1,
    Initialized = 2,
    Finalizing = 3,
    Finalized = 4,
    Forked = 5,
    Illegal = 6,
}

impl State {
    fn from_u8(v: u8) -> State {
        match v {
            0 => State::Unset,
            1 => State::Initializing,
            2 => State::Initialized,
            3 => State::Finalizing,
            4 => State::Finalized,
            5 => State::Forked,
            _ => State::Illegal,
        }
    }
}

static STATE: AtomicU8 = AtomicU8::new(State::Unset as u8);

/// Reads the current state without taking the init mutex.
pub fn current_state() -> State {
    State::from_u8(STATE.load(Ordering::Relaxed))
}

fn set_state(s: State) {
    STATE.store(s as u8, Ordering::Relaxed);
}

/// Bumped on every successful `init_with_config`, so a thread-local send
/// context created against an earlier runtime can tell it has outlived that
/// runtime (finalize + re-init in the same process, notably across a fork)
/// and needs to be rebuilt against the current queues rather than silently
/// sending into disconnected channels.
static GENERATION: AtomicU64 = AtomicU64::new(0);

/// The generation of the currently active runtime, or the last one if none
/// is active. Used by [`crate::tsd`] to detect a stale thread-local context.
pub fn current_generation() -> u64 {
    GENERATION.load(Ordering::Relaxed)
}

/// Where log records end up: `-`=stdout, `+`=stderr, else a path opened
/// `O_WRONLY|O_CREAT|O_APPEND`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sink {
    Stdout,
    Stderr,
    Path(String),
}

impl Sink {
    pub fn parse(sink: &str) -> Sink {
        match sink {
            "-" => Sink::Stdout,
            "+" => Sink::Stderr,
            other => Sink::Path(other.to_string()),
        }
    }
}

/// Opens (and immediately drops) the sink with the same flags the IHT will
/// use, so an unopenable path is reported as a `ConfigError` from `init()`
/// itself rather than as a generic timeout once the IHT, which only opens
/// its sink after replying to the startup handshake, fails silently from
/// `init()`'s point of view. `-`/`+` never fail here since `io::stdout()`/
/// `io::stderr()` can't.
fn open_sink_for_validation(sink: &Sink) -> crate::error::Result<()> {
    if let Sink::Path(path) = sink {
        OpenOptions::new()
            .write(true)
            .create(true)
            .append(true)
            .mode(0o644)
            .open(path)
            .map(drop)
            .map_err(|e| Error::ConfigError(format!("failed to open sink {path:?}: {e}")))?;
    }
    Ok(())
}

struct RuntimeInner {
    pid: u32,
    progname: String,
    sink: Sink,
    config: RuntimeConfig,
    data_queue: DataQueue,
    control_queue: ControlQueue,
    iht_handle: Option<JoinHandle<crate::error::Result<()>>>,
}

/// The single process-wide runtime: queue handles, the IHT join handle, and
/// the remembered `(progname, sink, config)` needed to re-`init` after a
/// fork. Guarded by one mutex so `init`/`finalize`/`flush`/fork hooks never
/// race each other.
static RUNTIME: OnceLock<Mutex<Option<RuntimeInner>>> = OnceLock::new();
static FORK_HANDLERS_INSTALLED: Once = Once::new();

fn runtime_slot() -> &'static Mutex<Option<RuntimeInner>> {
    RUNTIME.get_or_init(|| Mutex::new(None))
}

/// Initializes the logging runtime with default tunables. See
/// [`init_with_config`].
pub fn init(progname: &str, sink: &str) -> crate::error::Result<()> {
    init_with_config(progname, sink, RuntimeConfig::default())
}

/// Initializes the logging runtime: spawns the internal handler thread,
/// waits (bounded by `config.startup_timeout`) for its `Ready` reply, and
/// installs the fork handlers exactly once.
///
/// Valid only from [`State::Unset`] or [`State::Finalized`].
pub fn init_with_config(progname: &str, sink: &str, config: RuntimeConfig) -> crate::error::Result<()> {
    config
        .validate()
        .map_err(|e| Error::ConfigError(e.to_string()))?;

    let sink = Sink::parse(sink);
    // Validated (opened, then immediately dropped) before the state machine
    // moves to `Initializing`, so a bad path fails fast as `ConfigError`/
    // `SystemError` right here rather than only surfacing once the IHT
    // itself tries to open it — which would otherwise leave `init()`
    // blocked on the `Ready` handshake for the full `startup_timeout` before
    // returning a generic timeout error.
    open_sink_for_validation(&sink)?;

    let mut guard = runtime_slot().lock().expect("runtime mutex poisoned");

    let from = current_state();
    if from != State::Unset && from != State::Finalized {
        set_state(State::Illegal);
        return Err(Error::IllegalState {
            attempted: "init",
            from,
        });
    }
    set_state(State::Initializing);

    let pid = std::process::id();
    let (data_queue, data_rx) = DataQueue::bounded(pid, config.data_queue_capacity);
    let (control_queue, control_rx) = ControlQueue::unbounded();

    let iht_sink = sink.clone();
    let iht_progname = progname.to_string();
    let iht_config = config.clone();
    let ready_control_queue = control_queue.clone();

    let handle = std::thread::Builder::new()
        .name("bxilog-iht".to_string())
        .spawn(move || iht::run(iht_progname, pid, iht_sink, iht_config, data_rx, control_rx))
        .map_err(Error::SystemError)?;

    match ready_control_queue.request(ControlRequest::Ready, config.startup_timeout) {
        Some(ControlReply::Ready) => {}
        Some(other) => {
            set_state(State::Illegal);
            return Err(Error::ProtocolError(format!(
                "expected Ready reply at startup, got {other:?}"
            )));
        }
        None => {
            set_state(State::Illegal);
            return Err(Error::SystemError(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "internal handler thread failed to start in time",
            )));
        }
    }

    FORK_HANDLERS_INSTALLED.call_once(|| {
        // SAFETY: installed exactly once, for the life of the process.
        unsafe {
            libc::pthread_atfork(
                Some(fork_prepare),
                Some(fork_parent_post),
                Some(fork_child_post),
            );
        }
    });

    *guard = Some(RuntimeInner {
        pid,
        progname: progname.to_string(),
        sink,
        config,
        data_queue,
        control_queue,
        iht_handle: Some(handle),
    });
    GENERATION.fetch_add(1, Ordering::Relaxed);
    set_state(State::Initialized);
    Ok(())
}

/// Shuts the runtime down: sends `Exit`, joins the IHT, drops the queues.
/// Valid only from [`State::Initialized`].
pub fn finalize() -> crate::error::Result<()> {
    let mut guard = runtime_slot().lock().expect("runtime mutex poisoned");

    let from = current_state();
    if from != State::Initialized {
        set_state(State::Illegal);
        return Err(Error::IllegalState {
            attempted: "finalize",
            from,
        });
    }
    set_state(State::Finalizing);

    let inner = guard.take().expect("Initialized implies a runtime value");
    inner.control_queue.request_no_wait(ControlRequest::Exit);
    let iht_result = inner
        .iht_handle
        .map(|h| h.join().unwrap_or_else(|_| Err(Error::Assert("IHT thread panicked".into()))));

    set_state(State::Finalized);

    match iht_result {
        Some(Err(e)) => Err(e.chain("finalize: internal handler thread reported an error")),
        _ => Ok(()),
    }
}

/// Drains pending records and syncs the sink. No-op (returns `Ok(())`) if
/// not [`State::Initialized`]. Never recursively logs.
pub fn flush() -> crate::error::Result<()> {
    // Clone the control queue handle and timeout out from under a short
    // lock, then drop the guard before the blocking round-trip below: every
    // producer `log()` call also touches this mutex, so holding it across
    // the IHT's reply would stall all producer threads for the full
    // request/reply latency instead of just the other in-process threads
    // also calling `flush()`/`init()`/`finalize()`.
    let (control_queue, timeout) = {
        let guard = runtime_slot().lock().expect("runtime mutex poisoned");
        let Some(inner) = guard.as_ref() else {
            return Ok(());
        };
        if current_state() != State::Initialized {
            return Ok(());
        }
        (inner.control_queue.clone(), inner.config.startup_timeout)
    };
    match control_queue.request(ControlRequest::Flush, timeout) {
        Some(ControlReply::Flushed) => Ok(()),
        Some(other) => Err(Error::ProtocolError(format!(
            "expected Flushed reply, got {other:?}"
        ))),
        None => Err(Error::SystemError(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "flush request timed out",
        ))),
    }
}

/// Returns clones of this process's data/control queue handles plus the
/// current runtime generation, used by the producer path to build (or
/// rebuild, across a stale generation) a thread's TSD. `None` if the
/// runtime is not `Initialized`.
pub fn producer_queues() -> Option<(DataQueue, ControlQueue, usize, u64)> {
    let guard = runtime_slot().lock().expect("runtime mutex poisoned");
    let inner = guard.as_ref()?;
    Some((
        inner.data_queue.clone(),
        inner.control_queue.clone(),
        inner.config.scratch_buf_size,
        GENERATION.load(Ordering::Relaxed),
    ))
}

/// The internal logger used for recursive diagnostics (retry warnings,
/// signal-triggered CRITICAL records). Registered once, at process scope.
pub fn internal_logger() -> &'static std::sync::Arc<Logger> {
    static LOGGER: OnceLock<std::sync::Arc<Logger>> = OnceLock::new();
    LOGGER.get_or_init(|| {
        let logger = Logger::new("bxilog.internal", crate::level::Level::Lowest);
        crate::registry::register(logger.clone());
        logger
    })
}

/// Requests IHT shutdown without waiting for a reply; used by the
/// process-wide fatal-signal handler, which must not block.
pub fn request_shutdown_no_wait() {
    if let Some(inner) = runtime_slot().lock().expect("runtime mutex poisoned").as_ref() {
        inner.control_queue.request_no_wait(ControlRequest::Exit);
    }
}

/// A clone of the current control queue handle, if initialized; used to
/// hand the process-wide signal handler a way to request shutdown.
pub fn control_queue_handle() -> Option<ControlQueue> {
    runtime_slot()
        .lock()
        .expect("runtime mutex poisoned")
        .as_ref()
        .map(|inner| inner.control_queue.clone())
}

extern "C" fn fork_prepare() {
    match current_state() {
        State::Initializing | State::Finalizing => {
            // Forking mid-transition is unrecoverable; abort rather than
            // hand the child a half-initialized runtime.
            std::process::abort();
        }
        State::Initialized => {
            let _ = finalize();
            set_state(State::Forked);
        }
        _ => {}
    }
}

extern "C" fn fork_parent_post() {
    if current_state() != State::Forked {
        return;
    }
    set_state(State::Finalized);
    if let Some((progname, sink)) = remembered_identity() {
        if init(&progname, &sink).is_ok() {
            set_state(State::Initialized);
        }
    }
}

extern "C" fn fork_child_post() {
    if current_state() == State::Forked {
        *runtime_slot().lock().expect("runtime mutex poisoned") = None;
        set_state(State::Finalized);
    }
}

/// `(progname, sink)` remembered across a `finalize()` triggered by
/// `fork_prepare`, so `fork_parent_post` can re-`init` with the same
/// identity. Populated by `finalize()` only when called from the
/// fork-prepare path (steady-state `finalize()` calls clear it).
fn remembered_identity() -> Option<(String, String)> {
    LAST_IDENTITY.lock().expect("identity mutex poisoned").clone()
}

static LAST_IDENTITY: Mutex<Option<(String, String)>> = Mutex::new(None);

/// Records `(progname, sink)` so a subsequent fork can restore them.
/// Call this immediately after a successful [`init_with_config`].
pub fn remember_identity(progname: &str, sink: &str) {
    *LAST_IDENTITY.lock().expect("identity mutex poisoned") =
        Some((progname.to_string(), Sink::parse(sink).display_string()));
}

impl Sink {
    fn display_string(&self) -> String {
        match self {
            Sink::Stdout => "-".to_string(),
            Sink::Stderr => "+".to_string(),
            Sink::Path(p) => p.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn init_finalize_round_trip() {
        assert_eq!(current_state(), State::Unset);
        init("test-prog", "+").expect("init should succeed");
        assert_eq!(current_state(), State::Initialized);
        remember_identity("test-prog", "+");
        finalize().expect("finalize should succeed");
        assert_eq!(current_state(), State::Finalized);
    }

    #[test]
    #[serial]
    fn finalize_from_unset_is_illegal() {
        // Guard against a leftover Initialized state from another test in
        // this module (tests share the process-wide state by design).
        if current_state() == State::Initialized {
            let _ = finalize();
        }
        let result = finalize();
        assert!(matches!(result, Err(Error::IllegalState { .. })));
    }

    #[test]
    #[serial]
    fn flush_before_init_is_noop() {
        if current_state() == State::Initialized {
            let _ = finalize();
        }
        assert!(flush().is_ok());
    }
}

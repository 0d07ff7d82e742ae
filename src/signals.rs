// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Signal-safe shutdown: a dedicated signal-relay thread that turns a
//! Linux `signalfd` into channel messages the IHT's `Select` can observe,
//! plus an optional process-wide fatal-signal handler.

use crate::queue::ControlQueue;
#[cfg(target_os = "linux")]
use crate::queue::{SignalEvent, SignalQueue};
use nix::sys::signal::{SigSet, Signal};
#[cfg(target_os = "linux")]
use nix::sys::signalfd::{SfdFlags, SignalFd};
#[cfg(target_os = "linux")]
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Where a relayed signal's metadata came from, so a human description can
/// be built without re-reading kernel state.
#[derive(Debug, Clone, Copy)]
pub enum SignalOrigin {
    /// Built from a `signalfd_siginfo` read by the relay thread.
    SignalFd { si_code: i32 },
    /// Built from a `siginfo_t` passed to the process-wide handler.
    SigInfo { si_code: i32 },
}

/// The signals the IHT's signal-relay thread blocks at thread creation and
/// arms the `signalfd` for (the crash signals only; SIGQUIT/SIGTERM/SIGINT
/// are blocked so they don't kill the relay thread itself, but are not
/// armed on the fd: the IHT relays crash signals only, shutdown signals go
/// through the control queue instead.
#[cfg(target_os = "linux")]
pub const IHT_BLOCKED_SIGNALS: [Signal; 7] = [
    Signal::SIGSEGV,
    Signal::SIGBUS,
    Signal::SIGFPE,
    Signal::SIGILL,
    Signal::SIGQUIT,
    Signal::SIGTERM,
    Signal::SIGINT,
];

#[cfg(target_os = "linux")]
pub const IHT_ARMED_SIGNALS: [Signal; 4] =
    [Signal::SIGSEGV, Signal::SIGBUS, Signal::SIGFPE, Signal::SIGILL];

/// The signals the process-wide handler installs itself for.
pub const PROCESS_WIDE_SIGNALS: [Signal; 6] = [
    Signal::SIGSEGV,
    Signal::SIGBUS,
    Signal::SIGFPE,
    Signal::SIGILL,
    Signal::SIGINT,
    Signal::SIGTERM,
];

/// Opens a `signalfd` armed for [`IHT_ARMED_SIGNALS`], after blocking
/// [`IHT_BLOCKED_SIGNALS`] on the calling thread via `pthread_sigmask`.
/// Intended to be called from the IHT's dedicated signal-relay thread.
#[cfg(target_os = "linux")]
pub fn open_iht_signalfd() -> nix::Result<SignalFd> {
    let mut mask = SigSet::empty();
    for sig in IHT_BLOCKED_SIGNALS {
        mask.add(sig);
    }
    mask.thread_block()?;

    let mut armed = SigSet::empty();
    for sig in IHT_ARMED_SIGNALS {
        armed.add(sig);
    }
    SignalFd::with_flags(&armed, SfdFlags::SFD_CLOEXEC)
}

/// Blocks in `poll(2)` on `fd` until a signal arrives, reads one
/// `signalfd_siginfo`, and forwards it to `signal_queue`. Runs until the
/// process exits (the relay thread never returns under normal operation);
/// loops past `EINTR`.
#[cfg(target_os = "linux")]
pub fn run_signal_relay(mut fd: SignalFd, signal_queue: SignalQueue) {
    use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

    loop {
        let raw = fd.as_raw_fd();
        let mut fds = [PollFd::new(
            unsafe { std::os::fd::BorrowedFd::borrow_raw(raw) },
            PollFlags::POLLIN,
        )];
        match poll(&mut fds, PollTimeout::NONE) {
            Ok(_) => {}
            Err(nix::errno::Errno::EINTR) => continue,
            Err(_) => continue,
        }
        match fd.read_signal() {
            Ok(Some(siginfo)) => {
                signal_queue.send(SignalEvent {
                    signum: siginfo.ssi_signo as i32,
                    info: SignalOrigin::SignalFd {
                        si_code: siginfo.ssi_code,
                    },
                });
            }
            Ok(None) => continue,
            Err(nix::errno::Errno::EAGAIN) | Err(nix::errno::Errno::EINTR) => continue,
            Err(_) => continue,
        }
    }
}

/// Re-raises `signum` to the current thread with the default disposition
/// restored, guaranteeing the default crash semantics (core dump, exit
/// code `128 + signum`) are preserved once buffered records are on disk.
pub fn reraise_with_default_disposition(signum: i32) {
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler};
    if let Ok(signal) = Signal::try_from(signum) {
        let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
        // SAFETY: restoring the default disposition before re-raising is
        // the documented way to make a signal visible to the parent/shell
        // again; no other handler mutation races this call at exit time.
        let _ = unsafe { sigaction(signal, &default) };
        unsafe { libc::raise(signum) };
    }
}

/// Builds the human string for a signal, distinguishing user vs kernel
/// origin for `SIGINT`/`SIGTERM` and including `si_code` for crash
/// signals.
pub fn describe_signal(signum: i32, origin: SignalOrigin) -> String {
    let name = Signal::try_from(signum)
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|_| format!("signal {signum}"));
    let si_code = match origin {
        SignalOrigin::SignalFd { si_code } => si_code,
        SignalOrigin::SigInfo { si_code } => si_code,
    };
    match signum {
        s if s == Signal::SIGINT as i32 || s == Signal::SIGTERM as i32 => {
            let origin_desc = if si_code == libc::SI_USER {
                "sent by a user (kill/Ctrl-C)"
            } else if si_code == libc::SI_KERNEL {
                "sent by the kernel"
            } else {
                "origin unknown"
            };
            format!("{name}: {origin_desc} (si_code={si_code})")
        }
        _ => format!("{name}: crash signal (si_code={si_code})"),
    }
}

/// Process-wide "a fatal signal is already being handled" latch. A second
/// fatal signal observed while this is set aborts the process directly
/// instead of re-entering the handler.
static FATAL_IN_PROGRESS: AtomicBool = AtomicBool::new(false);

/// Installs the process-wide fatal-signal handler for
/// [`PROCESS_WIDE_SIGNALS`]. `control_queue` is used, best-effort and
/// non-blocking, to request IHT shutdown from within the handler.
///
/// # Safety
/// Must be called at most once; the handler itself only performs
/// async-signal-safe operations (a raw `write(2)` to stderr, atomics,
/// `nanosleep`, `sigaction`, `raise`).
pub fn install_sighandler(control_queue: ControlQueue) -> nix::Result<()> {
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler};

    // Leak the sender so the `extern "C"` handler (which cannot capture
    // state) can reach it through a raw pointer; there is exactly one
    // process-wide handler installation, so this is a one-time, bounded
    // leak for the life of the process.
    let boxed = Box::new(control_queue);
    let ptr = Box::into_raw(boxed);
    CONTROL_QUEUE_PTR.store(ptr as usize, Ordering::SeqCst);

    let mut mask = SigSet::empty();
    for sig in PROCESS_WIDE_SIGNALS {
        mask.add(sig);
    }

    let action = SigAction::new(
        SigHandler::SigAction(handle_fatal_signal),
        SaFlags::SA_SIGINFO,
        mask,
    );
    for sig in PROCESS_WIDE_SIGNALS {
        // SAFETY: see function doc; handler performs only async-signal-safe work.
        unsafe { sigaction(sig, &action)? };
    }
    Ok(())
}

static CONTROL_QUEUE_PTR: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

extern "C" fn handle_fatal_signal(
    signum: libc::c_int,
    info: *mut libc::siginfo_t,
    _ucontext: *mut libc::c_void,
) {
    if FATAL_IN_PROGRESS.swap(true, Ordering::SeqCst) {
        // SAFETY: `_exit` is async-signal-safe; a second fatal signal
        // while we're already unwinding means continuing is unsafe.
        unsafe { libc::_exit(128 + signum) };
    }

    let si_code = if info.is_null() {
        0
    } else {
        // SAFETY: `info` is the non-null siginfo_t the kernel handed us.
        unsafe { (*info).si_code }
    };
    let desc = describe_signal(signum, SignalOrigin::SigInfo { si_code });

    write_stderr_signal_safe(&desc);

    // Capturing and formatting a backtrace allocates, so it only happens
    // after the signal-safe stderr write above; by this point the process
    // is already committed to dying, so the allocation is an acceptable risk.
    let backtrace = backtrace::Backtrace::new();
    let full_report = format!("{desc}\n{backtrace:?}");

    crate::exit::log_critical_from_signal(signum, &full_report);

    let ptr = CONTROL_QUEUE_PTR.load(Ordering::SeqCst) as *const ControlQueue;
    if !ptr.is_null() {
        // SAFETY: `ptr` was produced by `Box::into_raw` in `install_sighandler`
        // and is never freed for the life of the process.
        let control_queue = unsafe { &*ptr };
        control_queue.request_no_wait(crate::protocol::ControlRequest::Exit);
    }

    sleep_resumable(Duration::from_secs(1));

    reraise_with_default_disposition(signum);
}

/// Writes `msg` to stderr using only `write(2)`, with no allocation, so it
/// is safe to call from within a signal handler.
fn write_stderr_signal_safe(msg: &str) {
    let bytes = msg.as_bytes();
    // SAFETY: `write` with a valid buffer and length is async-signal-safe.
    unsafe {
        libc::write(libc::STDERR_FILENO, bytes.as_ptr() as *const libc::c_void, bytes.len());
        libc::write(libc::STDERR_FILENO, b"\n".as_ptr() as *const libc::c_void, 1);
    }
}

/// Sleeps up to `dur`, resuming after `EINTR` rather than returning early,
/// via `clock_nanosleep` semantics.
fn sleep_resumable(dur: Duration) {
    let mut remaining = libc::timespec {
        tv_sec: dur.as_secs() as libc::time_t,
        tv_nsec: dur.subsec_nanos() as libc::c_long,
    };
    loop {
        let mut rem = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: both timespecs are valid, exclusively-owned stack values.
        let rc = unsafe { libc::nanosleep(&remaining, &mut rem) };
        if rc == 0 {
            break;
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            remaining = rem;
            continue;
        }
        break;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_sigint_user_origin() {
        let desc = describe_signal(Signal::SIGINT as i32, SignalOrigin::SigInfo {
            si_code: libc::SI_USER,
        });
        assert!(desc.contains("user"));
    }

    #[test]
    fn describe_crash_signal_includes_si_code() {
        let desc = describe_signal(
            Signal::SIGSEGV as i32,
            SignalOrigin::SignalFd { si_code: 1 },
        );
        assert!(desc.contains("si_code=1"));
    }
}

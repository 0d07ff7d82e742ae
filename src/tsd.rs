// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Thread-local send context (TSD): per-producer-thread state, created
//! lazily on first log call and torn down automatically when the thread
//! exits, via `thread_local!`'s native destructor support.

use crate::queue::{ControlQueue, DataQueue};
use std::cell::RefCell;
use std::sync::atomic::{AtomicU16, Ordering};

static NEXT_RANK: AtomicU16 = AtomicU16::new(0);

/// Per-thread producer state.
pub struct Tsd {
    /// Reusable message-formatting buffer; grown (and replaced) on the
    /// rare call whose formatted message exceeds its capacity.
    pub scratch: String,
    pub data_queue: DataQueue,
    pub control_queue: ControlQueue,
    pub tid: Option<i64>,
    pub rank: u16,
    /// The runtime generation these queue handles belong to; see
    /// [`with_tsd`].
    generation: u64,
}

impl Tsd {
    fn new(
        data_queue: DataQueue,
        control_queue: ControlQueue,
        scratch_buf_size: usize,
        generation: u64,
    ) -> Self {
        Tsd {
            scratch: String::with_capacity(scratch_buf_size),
            data_queue,
            control_queue,
            tid: current_kernel_tid(),
            rank: NEXT_RANK.fetch_add(1, Ordering::Relaxed),
            generation,
        }
    }
}

#[cfg(target_os = "linux")]
fn current_kernel_tid() -> Option<i64> {
    // SAFETY: `gettid` has no preconditions.
    Some(unsafe { libc::syscall(libc::SYS_gettid) } as i64)
}

#[cfg(not(target_os = "linux"))]
fn current_kernel_tid() -> Option<i64> {
    None
}

thread_local! {
    static TSD: RefCell<Option<Tsd>> = const { RefCell::new(None) };
}

/// Runs `f` with this thread's TSD, creating it first via `make` if this is
/// the thread's first log call since the library was (re-)initialized, or
/// rebuilding it if the thread's existing TSD was built against an earlier
/// runtime generation (the thread logged before a `finalize()` followed by
/// a fresh `init()`, which replaces the underlying queues without this
/// thread ever observing the transition directly).
///
/// `make` is only called on that first-build / stale-generation path, never
/// on the steady-state hot path where this thread's cached queue handles
/// are still current — callers should pass something like
/// `lifecycle::producer_queues` directly rather than invoking it eagerly,
/// so the runtime mutex it locks is only taken when actually needed.
/// Returns `None` without calling `f` if `make` itself returns `None`
/// (the runtime isn't initialized).
pub fn with_tsd<R>(
    make: impl FnOnce() -> Option<(DataQueue, ControlQueue, usize, u64)>,
    f: impl FnOnce(&mut Tsd) -> R,
) -> Option<R> {
    TSD.with(|cell| {
        let mut slot = cell.borrow_mut();
        let needs_init = match slot.as_ref() {
            None => true,
            Some(tsd) => tsd.generation != crate::lifecycle::current_generation(),
        };
        if needs_init {
            let (data_queue, control_queue, scratch_buf_size, generation) = make()?;
            *slot = Some(Tsd::new(data_queue, control_queue, scratch_buf_size, generation));
        }
        Some(f(slot.as_mut().expect("just initialized")))
    })
}

/// Drops this thread's TSD, if any, closing its queue handles. Called
/// explicitly by `finalize()` bookkeeping is unnecessary: dropping the
/// `Runtime`'s channel senders is what actually tears down the channels,
/// but a thread that logs again after finalize gets a fresh TSD bound to
/// the new `Runtime` on re-init.
pub fn clear_tsd() {
    TSD.with(|cell| {
        *cell.borrow_mut() = None;
    });
}

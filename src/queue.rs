// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The concrete queueing primitive this crate owns rather than assumes:
//! bounded channels satisfying the push/pull (data) and request/reply
//! (control) contracts the rest of the design depends on.
//!
//! `inproc://<pid>_data` / `inproc://<pid>_control` style URLs describe a
//! conceptual naming scheme for an external messaging transport; this
//! crate's transport is in-process by construction (`crossbeam_channel`),
//! so the pid only needs to show up in diagnostics, not in an actual
//! endpoint address.

use crate::protocol::{ControlReply, ControlRequest};
use crate::record::Record;
use crossbeam_channel::{Receiver, Sender};

/// The data channel: producers `try_send`/`send` [`Record`] values;
/// the IHT is the sole receiver.
#[derive(Clone)]
pub struct DataQueue {
    pid: u32,
    tx: Sender<Record>,
}

pub struct DataQueueReceiver {
    pid: u32,
    rx: Receiver<Record>,
}

impl DataQueue {
    pub fn bounded(pid: u32, capacity: usize) -> (DataQueue, DataQueueReceiver) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (DataQueue { pid, tx }, DataQueueReceiver { pid, rx })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn try_send(&self, record: Record) -> Result<(), crossbeam_channel::TrySendError<Record>> {
        self.tx.try_send(record)
    }

    pub fn send(&self, record: Record) -> Result<(), crossbeam_channel::SendError<Record>> {
        self.tx.send(record)
    }
}

impl DataQueueReceiver {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn receiver(&self) -> &Receiver<Record> {
        &self.rx
    }
}

/// One in-flight control request: the literal ASCII body plus a one-shot
/// reply channel, modeling REQ/REP without a general-purpose RPC layer.
pub struct ControlEnvelope {
    pub request: ControlRequest,
    pub reply_tx: Sender<ControlReply>,
}

/// The control channel: producers send a [`ControlEnvelope`] and block on
/// its one-shot reply channel; the IHT is the sole receiver.
#[derive(Clone)]
pub struct ControlQueue {
    tx: Sender<ControlEnvelope>,
}

pub struct ControlQueueReceiver {
    rx: Receiver<ControlEnvelope>,
}

impl ControlQueue {
    pub fn unbounded() -> (ControlQueue, ControlQueueReceiver) {
        // The control path is low volume (startup, flush, exit) relative to
        // the data path; a small bound is enough to apply back-pressure
        // without ever plausibly filling up in practice.
        let (tx, rx) = crossbeam_channel::bounded(16);
        (ControlQueue { tx }, ControlQueueReceiver { rx })
    }

    /// Sends `request` and blocks for the matching reply, bounded by
    /// `timeout`. Returns `None` on timeout.
    pub fn request(
        &self,
        request: ControlRequest,
        timeout: std::time::Duration,
    ) -> Option<ControlReply> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        if self
            .tx
            .send(ControlEnvelope { request, reply_tx })
            .is_err()
        {
            return None;
        }
        reply_rx.recv_timeout(timeout).ok()
    }

    /// Sends `request` without waiting for a reply (best-effort, used by
    /// the signal handler to request shutdown without blocking in a
    /// signal context any longer than necessary).
    pub fn request_no_wait(&self, request: ControlRequest) {
        let (reply_tx, _reply_rx) = crossbeam_channel::bounded(1);
        let _ = self.tx.try_send(ControlEnvelope { request, reply_tx });
    }
}

impl ControlQueueReceiver {
    pub fn receiver(&self) -> &Receiver<ControlEnvelope> {
        &self.rx
    }
}

/// One relayed signal, handed from the signal-relay thread to the IHT's
/// `Select` loop.
#[derive(Debug, Clone, Copy)]
pub struct SignalEvent {
    pub signum: i32,
    pub info: crate::signals::SignalOrigin,
}

#[derive(Clone)]
pub struct SignalQueue {
    tx: Sender<SignalEvent>,
}

pub struct SignalQueueReceiver {
    rx: Receiver<SignalEvent>,
}

impl SignalQueue {
    pub fn bounded_one() -> (SignalQueue, SignalQueueReceiver) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        (SignalQueue { tx }, SignalQueueReceiver { rx })
    }

    pub fn send(&self, event: SignalEvent) {
        // A full queue means a signal is already being processed; dropping
        // a duplicate notification here is correct, not a bug.
        let _ = self.tx.try_send(event);
    }
}

impl SignalQueueReceiver {
    pub fn receiver(&self) -> &Receiver<SignalEvent> {
        &self.rx
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The request/reply handshake between producers and the internal handler
//! thread. Kept as literal ASCII string constants (not just enum variant
//! names) so the wire contract stays human-auditable, matching the
//! original's string-literal protocol.

use crate::error::Error;

pub const READY_REQUEST: &str = "BC->IH: ready?";
pub const READY_REPLY: &str = "IH->BC: ready!";
pub const FLUSH_REQUEST: &str = "BC->IH: flush?";
pub const FLUSH_REPLY: &str = "IH->BC: flushed!";
pub const EXIT_REQUEST: &str = "BC->IH: exit?";

/// A request a producer (or the lifecycle controller) sends to the IHT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    Ready,
    Flush,
    Exit,
}

impl ControlRequest {
    pub fn as_wire(self) -> &'static str {
        match self {
            ControlRequest::Ready => READY_REQUEST,
            ControlRequest::Flush => FLUSH_REQUEST,
            ControlRequest::Exit => EXIT_REQUEST,
        }
    }
}

/// A reply the IHT sends back for a request (`Exit` has none).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlReply {
    Ready,
    Flushed,
}

impl ControlReply {
    pub fn as_wire(self) -> &'static str {
        match self {
            ControlReply::Ready => READY_REPLY,
            ControlReply::Flushed => FLUSH_REPLY,
        }
    }

    /// The reply a producer should receive for `request`, used to validate
    /// an unexpected reply is flagged as a protocol error rather than
    /// silently accepted.
    pub fn expected_for(request: ControlRequest) -> Option<ControlReply> {
        match request {
            ControlRequest::Ready => Some(ControlReply::Ready),
            ControlRequest::Flush => Some(ControlReply::Flushed),
            ControlRequest::Exit => None,
        }
    }

    pub fn matches(self, request: ControlRequest) -> Result<(), Error> {
        match ControlReply::expected_for(request) {
            Some(expected) if expected == self => Ok(()),
            Some(expected) => Err(Error::ProtocolError(format!(
                "expected reply {:?} for request {:?}, got {:?}",
                expected.as_wire(),
                request,
                self.as_wire()
            ))),
            None => Err(Error::ProtocolError(format!(
                "request {:?} expects no reply, but got {:?}",
                request,
                self.as_wire()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_literals_match_spec() {
        assert_eq!(ControlRequest::Ready.as_wire(), "BC->IH: ready?");
        assert_eq!(ControlReply::Ready.as_wire(), "IH->BC: ready!");
        assert_eq!(ControlRequest::Flush.as_wire(), "BC->IH: flush?");
        assert_eq!(ControlReply::Flushed.as_wire(), "IH->BC: flushed!");
        assert_eq!(ControlRequest::Exit.as_wire(), "BC->IH: exit?");
    }

    #[test]
    fn mismatched_reply_is_protocol_error() {
        assert!(ControlReply::Flushed.matches(ControlRequest::Ready).is_err());
    }

    #[test]
    fn matching_reply_is_ok() {
        assert!(ControlReply::Ready.matches(ControlRequest::Ready).is_ok());
        assert!(ControlReply::Flushed.matches(ControlRequest::Flush).is_ok());
    }
}

//! The closed set of wire messages and their datagram `bincode` codec.

use crate::id::Id;
use crate::pointer::Pointer;
use serde::{Deserialize, Serialize};
use std::io;

/// A tagged message. Each variant is a `(kind, payload)` pair; the enum discriminant
/// itself stands in for `kind` and the variant's fields are the kind-dependent `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Ping,
    Pong,
    GetSuccList,
    GotSuccList(Vec<Pointer>),
    GetPredAndSuccs,
    GotPredAndSuccs(Option<Pointer>, Vec<Pointer>),
    GetBestPredecessor(Id),
    GotBestPredecessor(Pointer),
    Notify,
}

/// The closed tag set used for query/response matching, independent of payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Ping,
    Pong,
    GetSuccList,
    GotSuccList,
    GetPredAndSuccs,
    GotPredAndSuccs,
    GetBestPredecessor,
    GotBestPredecessor,
    Notify,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Ping => MessageKind::Ping,
            Message::Pong => MessageKind::Pong,
            Message::GetSuccList => MessageKind::GetSuccList,
            Message::GotSuccList(_) => MessageKind::GotSuccList,
            Message::GetPredAndSuccs => MessageKind::GetPredAndSuccs,
            Message::GotPredAndSuccs(_, _) => MessageKind::GotPredAndSuccs,
            Message::GetBestPredecessor(_) => MessageKind::GetBestPredecessor,
            Message::GotBestPredecessor(_) => MessageKind::GotBestPredecessor,
            Message::Notify => MessageKind::Notify,
        }
    }

    /// Whether this kind is one of the closed server-request kinds handled unconditionally
    /// by `recv_handler`, as opposed to a response that must match an in-flight query.
    pub fn is_request(&self) -> bool {
        matches!(
            self.kind(),
            MessageKind::Ping
                | MessageKind::GetSuccList
                | MessageKind::GetPredAndSuccs
                | MessageKind::GetBestPredecessor
                | MessageKind::Notify
        )
    }
}

/// A single `(sender, message)` frame as carried over the wire, so the receiver never has
/// to infer the sender's advertised `Pointer` from the raw socket address alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub from: Pointer,
    pub message: Message,
}

/// Decodes a single datagram (no length prefix — UDP already frames the payload).
pub fn decode_datagram(body: &[u8]) -> io::Result<Frame> {
    bincode::deserialize(body).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Encodes a single datagram payload (no length prefix).
pub fn encode_datagram(frame: &Frame) -> io::Result<Vec<u8>> {
    bincode::serialize(frame).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

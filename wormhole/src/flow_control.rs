// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Link-level flow control.
//!
//! Every link has a sender half ([OutputFlowControl]) next to the buffer that
//! feeds the link and a receiver half ([InputFlowControl]) next to the buffer
//! the link fills. Downstream the link carries `{data, valid}`, upstream a
//! single `return` wire, which is always driven from a register.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

mod credit;
mod handshake;
pub use credit::{CreditReceiver, CreditSender};
pub use handshake::{HandshakeReceiver, HandshakeSender, HandshakeState};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowControlKind {
    Credit,
    Handshake,
}

impl Default for FlowControlKind {
    fn default() -> Self {
        Self::Credit
    }
}

impl FromStr for FlowControlKind {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            "credit" | "credit-based" => Ok(Self::Credit),
            "handshake" => Ok(Self::Handshake),
            _ => Err(Error::InvalidConfiguration(format!(
                "unknown flow control '{}'",
                name
            ))),
        }
    }
}

impl fmt::Display for FlowControlKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Credit => write!(f, "credit"),
            Self::Handshake => write!(f, "handshake"),
        }
    }
}

/// What the sender drives in one cycle.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SenderSignals {
    /// `valid` on the link.
    pub valid: bool,
    /// Pops the sender's buffer.
    pub read: bool,
}

/// Sender half of a link.
#[derive(Clone, Debug)]
pub enum OutputFlowControl {
    Credit(CreditSender),
    Handshake(HandshakeSender),
}

impl OutputFlowControl {
    pub fn new(kind: FlowControlKind, credits: usize) -> Self {
        match kind {
            FlowControlKind::Credit => Self::Credit(CreditSender::new(credits)),
            FlowControlKind::Handshake => Self::Handshake(HandshakeSender::new()),
        }
    }

    /// Whether the sender would consume a flit this cycle if one were
    /// offered. Independent of `read_ok`, which lets a pass-through buffer
    /// derive its `write_ok` from it.
    pub fn ready(&self, return_in: bool, hold_send: bool) -> bool {
        match self {
            Self::Credit(sender) => !hold_send && sender.can_send(return_in),
            Self::Handshake(sender) => sender.consumes(return_in),
        }
    }

    /// `read_ok` must already be gated by the hold-send input.
    pub fn evaluate(&self, read_ok: bool, return_in: bool) -> SenderSignals {
        match self {
            Self::Credit(sender) => sender.evaluate(read_ok, return_in),
            Self::Handshake(sender) => sender.evaluate(read_ok, return_in),
        }
    }

    pub fn commit(&mut self, read_ok: bool, return_in: bool) {
        match self {
            Self::Credit(sender) => sender.commit(read_ok, return_in),
            Self::Handshake(sender) => sender.commit(read_ok, return_in),
        }
    }

    pub fn credits(&self) -> Option<usize> {
        match self {
            Self::Credit(sender) => Some(sender.credits()),
            Self::Handshake(_) => None,
        }
    }
}

/// Receiver half of a link.
#[derive(Clone, Debug)]
pub enum InputFlowControl {
    Credit(CreditReceiver),
    Handshake(HandshakeReceiver),
}

impl InputFlowControl {
    pub fn new(kind: FlowControlKind) -> Self {
        match kind {
            FlowControlKind::Credit => Self::Credit(CreditReceiver::new()),
            FlowControlKind::Handshake => Self::Handshake(HandshakeReceiver::new()),
        }
    }

    /// The upstream `return` wire.
    pub fn return_out(&self) -> bool {
        match self {
            Self::Credit(receiver) => receiver.return_out(),
            Self::Handshake(receiver) => receiver.return_out(),
        }
    }

    /// Whether the link data is written into the buffer this cycle.
    pub fn write(&self, valid_in: bool) -> bool {
        match self {
            Self::Credit(_) => valid_in,
            Self::Handshake(receiver) => receiver.write(),
        }
    }

    /// `read_fired` is `read && read_ok` of the buffer this receiver fills.
    pub fn commit(&mut self, valid_in: bool, write_ok: bool, read_fired: bool) {
        match self {
            Self::Credit(receiver) => receiver.commit(read_fired),
            Self::Handshake(receiver) => receiver.commit(valid_in, write_ok),
        }
    }
}

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

//! Four-phase valid/ack handshake.
//!
//! ```text
//!            sender                          receiver
//!   S0 --(data && !ack)--> S1        S0 --(valid && space)--> S1
//!   S1 --(ack, pop)------> S2        S1 --(write, ack)------> S2
//!   S2 --(!ack)----------> S0 | S1   S2 --(!valid)----------> S0
//! ```

use log::trace;

use super::SenderSignals;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HandshakeState {
    /// S0
    Idle,
    /// S1
    Transfer,
    /// S2
    Hold,
}

impl Default for HandshakeState {
    fn default() -> Self {
        Self::Idle
    }
}

#[derive(Clone, Debug, Default)]
pub struct HandshakeSender {
    state: HandshakeState,
}

impl HandshakeSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// The flit on the link is taken this cycle.
    pub fn consumes(&self, return_in: bool) -> bool {
        self.state == HandshakeState::Transfer && return_in
    }

    pub fn evaluate(&self, _read_ok: bool, return_in: bool) -> SenderSignals {
        SenderSignals {
            valid: self.state == HandshakeState::Transfer,
            read: self.consumes(return_in),
        }
    }

    pub fn commit(&mut self, read_ok: bool, return_in: bool) {
        let next = match self.state {
            HandshakeState::Idle if read_ok && !return_in => HandshakeState::Transfer,
            HandshakeState::Transfer if return_in => HandshakeState::Hold,
            HandshakeState::Hold if !return_in => {
                if read_ok {
                    HandshakeState::Transfer
                } else {
                    HandshakeState::Idle
                }
            }
            state => state,
        };
        if next != self.state {
            trace!("handshake sender {:?} -> {:?}", self.state, next);
        }
        self.state = next;
    }
}

#[derive(Clone, Debug, Default)]
pub struct HandshakeReceiver {
    state: HandshakeState,
}

impl HandshakeReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// ack
    pub fn return_out(&self) -> bool {
        self.state != HandshakeState::Idle
    }

    pub fn write(&self) -> bool {
        self.state == HandshakeState::Transfer
    }

    pub fn commit(&mut self, valid_in: bool, write_ok: bool) {
        if self.write() && !valid_in {
            protocol_violation!("handshake receiver accepting without valid data");
        }
        let next = match self.state {
            HandshakeState::Idle if valid_in && write_ok => HandshakeState::Transfer,
            HandshakeState::Transfer => HandshakeState::Hold,
            HandshakeState::Hold if !valid_in => HandshakeState::Idle,
            state => state,
        };
        if next != self.state {
            trace!("handshake receiver {:?} -> {:?}", self.state, next);
        }
        self.state = next;
    }
}

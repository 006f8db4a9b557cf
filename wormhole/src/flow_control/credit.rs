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

use log::trace;

use super::SenderSignals;

/// Credit counter on the sending side of a link.
///
/// Each credit stands for one free slot in the receiver's buffer.
#[derive(Clone, Debug)]
pub struct CreditSender {
    credits: usize,
    max_credits: usize,
}

impl CreditSender {
    pub fn new(max_credits: usize) -> Self {
        Self {
            credits: max_credits,
            max_credits,
        }
    }

    pub fn credits(&self) -> usize {
        self.credits
    }

    pub fn max_credits(&self) -> usize {
        self.max_credits
    }

    /// A credit returned this cycle can be spent this cycle.
    pub fn can_send(&self, return_in: bool) -> bool {
        self.credits > 0 || return_in
    }

    pub fn evaluate(&self, read_ok: bool, return_in: bool) -> SenderSignals {
        let send = read_ok && self.can_send(return_in);
        SenderSignals {
            valid: send,
            read: send,
        }
    }

    pub fn commit(&mut self, read_ok: bool, return_in: bool) {
        let send = self.evaluate(read_ok, return_in).valid;
        match (send, return_in) {
            (true, false) => self.credits -= 1,
            (false, true) if self.credits < self.max_credits => self.credits += 1,
            // send with a simultaneous return, or nothing happening
            _ => {}
        }
        trace!("credits: {}/{}", self.credits, self.max_credits);
    }
}

/// Receiving side of a credit link: acknowledges every read one cycle later.
#[derive(Clone, Debug, Default)]
pub struct CreditReceiver {
    ret: bool,
}

impl CreditReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn return_out(&self) -> bool {
        self.ret
    }

    pub fn commit(&mut self, read_fired: bool) {
        self.ret = read_fired;
    }
}

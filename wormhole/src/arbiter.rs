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

use bitvec::prelude::*;
use log::debug;

use crate::priority::{OneHot, PriorityGenerator, PriorityPolicy};
use crate::Error;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ArbiterState {
    Idle,
    Granting(usize),
}

/// Grants one output port to at most one of `inputs` requesters per cycle.
///
/// Once an input wins, it keeps the grant for as long as it keeps
/// requesting, so the flits of one packet are never interleaved with
/// another's. Only then is the priority vector consulted again.
#[derive(Clone, Debug)]
pub struct Arbiter {
    generator: PriorityGenerator,
    /// The input granted last cycle, if any.
    winner: Option<usize>,
    inputs: usize,
}

impl Arbiter {
    pub fn new(inputs: usize, policy: &PriorityPolicy) -> Result<Self, Error> {
        Ok(Self {
            generator: PriorityGenerator::new(policy, inputs)?,
            winner: None,
            inputs,
        })
    }

    pub fn inputs(&self) -> usize {
        self.inputs
    }

    pub fn priority(&self) -> &OneHot {
        self.generator.priority()
    }

    pub fn state(&self) -> ArbiterState {
        match self.winner {
            Some(input) => ArbiterState::Granting(input),
            None => ArbiterState::Idle,
        }
    }

    /// The input granted this cycle.
    pub fn evaluate(&self, requests: &BitSlice<usize, Lsb0>) -> Option<usize> {
        debug_assert_eq!(requests.len(), self.inputs);
        match self.winner {
            Some(input) if requests[input] => Some(input),
            _ => programmable_priority_encoder(requests, self.priority().index()),
        }
    }

    /// The grant of this cycle as a bit vector (one-hot or empty).
    pub fn grants(&self, requests: &BitSlice<usize, Lsb0>) -> BitVec<usize, Lsb0> {
        grant_vector(self.inputs, self.evaluate(requests))
    }

    pub fn commit(&mut self, grant: Option<usize>) {
        if grant != self.winner {
            debug!("arbiter {:?} -> {:?}", self.winner, grant);
        }
        self.generator.commit(&grant_vector(self.inputs, grant));
        self.winner = grant;
    }
}

fn grant_vector(inputs: usize, grant: Option<usize>) -> BitVec<usize, Lsb0> {
    let mut bits = BitVec::repeat(false, inputs);
    if let Some(input) = grant {
        bits.set(input, true);
    }
    bits
}

/// Scans the requests starting at `priority` in increasing index order,
/// wrapping around, and returns the first requester.
pub fn programmable_priority_encoder(
    requests: &BitSlice<usize, Lsb0>,
    priority: usize,
) -> Option<usize> {
    let n = requests.len();
    (0..n).map(|k| (priority + k) % n).find(|&i| requests[i])
}

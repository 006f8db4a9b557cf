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

use crate::Flit;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WriteStatus {
    Accepted,
    /// The buffer was full; the flit was not stored.
    Rejected,
}

/// A fixed-depth circular flit queue owned by exactly one port.
///
/// A depth of zero turns the buffer into a combinational pass-through: the
/// reader sees whatever is being written this cycle and the writer may write
/// only while the reader is ready, nothing is ever stored.
#[derive(Clone, Debug)]
pub struct FlitBuffer {
    /// Storage for the queued flits.
    slots: Vec<Option<Flit>>,

    /// The write pointer into the circular buffer.
    write_idx: usize,

    /// The read pointer into the circular buffer.
    read_idx: usize,

    /// The number of flits in the buffer.
    occupancy: usize,
}

impl FlitBuffer {
    pub fn new(depth: usize) -> Self {
        Self {
            slots: vec![None; depth],
            write_idx: 0,
            read_idx: 0,
            occupancy: 0,
        }
    }

    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    pub fn is_pass_through(&self) -> bool {
        self.depth() == 0
    }

    pub fn occupancy(&self) -> usize {
        self.occupancy
    }

    pub fn is_empty(&self) -> bool {
        self.occupancy == 0
    }

    pub fn is_full(&self) -> bool {
        self.occupancy == self.depth()
    }

    /// The oldest stored flit, without removing it.
    pub fn front(&self) -> Option<&Flit> {
        if self.is_empty() {
            None
        } else {
            self.slots[self.read_idx].as_ref()
        }
    }

    fn idx_incr(&self, idx: usize) -> usize {
        (idx + 1) % self.depth()
    }

    pub fn try_write(&mut self, flit: Flit) -> WriteStatus {
        if self.is_full() {
            return WriteStatus::Rejected;
        }
        self.slots[self.write_idx] = Some(flit);
        self.write_idx = self.idx_incr(self.write_idx);
        self.occupancy += 1;
        WriteStatus::Accepted
    }

    pub fn try_read(&mut self) -> Option<Flit> {
        if self.is_empty() {
            return None;
        }
        let flit = self.slots[self.read_idx].take();
        self.read_idx = self.idx_incr(self.read_idx);
        self.occupancy -= 1;
        flit
    }

    /// Whether the reader may read this cycle. `write_valid` only matters in
    /// pass-through mode.
    pub fn read_ok(&self, write_valid: bool) -> bool {
        if self.is_pass_through() {
            write_valid
        } else {
            !self.is_empty()
        }
    }

    /// Whether the writer may write this cycle. `read_ready` only matters in
    /// pass-through mode.
    pub fn write_ok(&self, read_ready: bool) -> bool {
        if self.is_pass_through() {
            read_ready
        } else {
            !self.is_full()
        }
    }

    /// The flit the reader sees this cycle.
    pub fn dout<'a>(&'a self, incoming: Option<&'a Flit>) -> Option<&'a Flit> {
        if self.is_pass_through() {
            incoming
        } else {
            self.front()
        }
    }

    /// Clock edge: applies this cycle's read and write.
    ///
    /// Both are judged against the state the cycle started with, so a full
    /// buffer that is read and written at once keeps its occupancy.
    pub fn commit(&mut self, write: Option<Flit>, read: bool) {
        if self.is_pass_through() {
            return;
        }
        let was_full = self.is_full();
        if read {
            if self.try_read().is_none() {
                protocol_violation!("read from an empty buffer");
            }
        }
        if let Some(flit) = write {
            if was_full {
                protocol_violation!("write of {:?} into a full buffer", flit);
            } else {
                self.try_write(flit);
            }
        }
        trace!(
            "buffer read_idx: {}, write_idx: {}, occupancy: {}",
            self.read_idx,
            self.write_idx,
            self.occupancy
        );
    }
}

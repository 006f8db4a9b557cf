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

use crate::{CircuitCommand, Flit, FlitFormat};

/// Registered output of a [RequestRegister].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestState {
    /// One bit per output port.
    pub request: BitVec<usize, Lsb0>,
    /// Circuit latch: while set, trailers do not release the outputs.
    pub circuit: bool,
}

impl RequestState {
    fn idle(outputs: usize) -> Self {
        Self {
            request: BitVec::repeat(false, outputs),
            circuit: false,
        }
    }
}

/// Remembers where the packet at the head of an input buffer is going.
///
/// The request is latched from the header and held until the trailer
/// leaves the buffer, so every flit of the packet follows the header.
#[derive(Clone, Debug)]
pub struct RequestRegister {
    port: usize,
    format: FlitFormat,
    /// Honour the circuit command field in headers.
    circuit_switching: bool,
    state: RequestState,
}

impl RequestRegister {
    pub fn new(port: usize, outputs: usize, format: FlitFormat, circuit_switching: bool) -> Self {
        Self {
            port,
            format,
            circuit_switching,
            state: RequestState::idle(outputs),
        }
    }

    pub fn request(&self) -> &BitSlice<usize, Lsb0> {
        &self.state.request
    }

    pub fn requesting(&self) -> bool {
        self.state.request.any()
    }

    pub fn circuit_set(&self) -> bool {
        self.state.circuit
    }

    /// Next register state.
    ///
    /// `head` is the buffer head when `read_ok` holds, `read_by` the output
    /// it leaves through this cycle, if it leaves. `route` is only asked
    /// about headers.
    ///
    /// A route may offer several outputs; once the header leaves through
    /// one of them, the rest of the packet is bound to that output.
    pub fn evaluate<F>(&self, head: Option<&Flit>, read_by: Option<usize>, route: F) -> RequestState
    where
        F: FnOnce(&Flit) -> BitVec<usize, Lsb0>,
    {
        let mut next = self.state.clone();
        let head = match head {
            Some(head) => head,
            None => return next,
        };
        if head.is_bop() {
            if !self.requesting() {
                let mut direction = route(head);
                direction.resize(next.request.len(), false);
                // no U-turns
                direction.set(self.port, false);
                if direction.not_any() {
                    protocol_violation!("header at input {} has no route: {:?}", self.port, head);
                }
                next.request = direction;
            }
            if let Some(output) = read_by {
                next.request.fill(false);
                next.request.set(output, true);
            }
            if self.circuit_switching {
                match head.circuit_command(&self.format) {
                    CircuitCommand::Allocate => next.circuit = true,
                    CircuitCommand::Release => next.circuit = false,
                    CircuitCommand::None => {}
                }
            }
        }
        // the latch is judged on the value the cycle started with
        if read_by.is_some() && head.is_eop() && !self.state.circuit {
            next.request.fill(false);
        }
        next
    }

    pub fn commit(&mut self, next: RequestState) {
        if next.request != self.state.request {
            if next.request.any() {
                debug!("input {} requests {}", self.port, next.request);
            } else {
                debug!("input {} released {}", self.port, self.state.request);
            }
        }
        if next.circuit != self.state.circuit {
            debug!("input {} circuit {}", self.port, next.circuit);
        }
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Packet;
    use std::rc::Rc;

    const OUTPUTS: usize = 5;

    fn to(port: usize) -> impl FnOnce(&Flit) -> BitVec<usize, Lsb0> {
        move |_| {
            let mut bits = BitVec::repeat(false, OUTPUTS);
            bits.set(port, true);
            bits
        }
    }

    fn no_route(_: &Flit) -> BitVec<usize, Lsb0> {
        panic!("payload flits are never routed");
    }

    fn packet(format: &FlitFormat, payload: usize, command: CircuitCommand) -> Vec<Flit> {
        Rc::new(Packet::new(0, 3, payload, 0)).to_flits(format, command)
    }

    /// `read` takes the head through the output currently requested.
    fn step(register: &mut RequestRegister, head: Option<&Flit>, read: bool, port: usize) {
        let read_by = if read {
            register.request().first_one()
        } else {
            None
        };
        let next = register.evaluate(head, read_by, to(port));
        register.commit(next);
    }

    #[test]
    fn holds_for_the_packet() {
        let _ = env_logger::builder().is_test(true).try_init();
        let format = FlitFormat::default();
        let flits = packet(&format, 2, CircuitCommand::None);
        let mut register = RequestRegister::new(0, OUTPUTS, format, false);

        // header visible but not yet granted
        step(&mut register, Some(&flits[0]), false, 3);
        assert_eq!(register.request().iter_ones().collect::<Vec<_>>(), vec![3]);
        step(&mut register, Some(&flits[0]), true, 3);
        assert!(register.requesting());
        let next = register.evaluate(Some(&flits[1]), Some(3), no_route);
        register.commit(next);
        assert!(register.requesting());
        // trailer waiting for the output
        step(&mut register, Some(&flits[2]), false, 3);
        assert!(register.requesting());
        step(&mut register, Some(&flits[2]), true, 3);
        assert!(!register.requesting());
    }

    #[test]
    fn later_headers_do_not_reroute() {
        let format = FlitFormat::default();
        let first = packet(&format, 1, CircuitCommand::None);
        let mut register = RequestRegister::new(0, OUTPUTS, format, false);
        step(&mut register, Some(&first[0]), false, 2);
        // a header seen again while requesting keeps the old route
        step(&mut register, Some(&first[0]), false, 4);
        assert_eq!(register.request().first_one(), Some(2));
    }

    #[test]
    fn empty_buffer_changes_nothing() {
        let format = FlitFormat::default();
        let mut register = RequestRegister::new(1, OUTPUTS, format, false);
        let next = register.evaluate(None, None, no_route);
        assert_eq!(next, RequestState::idle(OUTPUTS));
        register.commit(next);
        assert!(!register.requesting());
    }

    #[test]
    fn own_port_is_masked() {
        let format = FlitFormat::default();
        let flits = packet(&format, 1, CircuitCommand::None);
        let mut register = RequestRegister::new(2, OUTPUTS, format, false);
        let next = register.evaluate(Some(&flits[0]), None, |_: &Flit| bitvec![0, 0, 1, 1, 0]);
        register.commit(next);
        assert_eq!(register.request().iter_ones().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn u_turn_has_no_route() {
        let format = FlitFormat::default();
        let flits = packet(&format, 1, CircuitCommand::None);
        let register = RequestRegister::new(2, OUTPUTS, format, false);
        register.evaluate(Some(&flits[0]), None, to(2));
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn u_turn_is_dropped() {
        let format = FlitFormat::default();
        let flits = packet(&format, 1, CircuitCommand::None);
        let mut register = RequestRegister::new(2, OUTPUTS, format, false);
        let next = register.evaluate(Some(&flits[0]), None, to(2));
        assert!(next.request.not_any());
        register.commit(next);
        assert!(!register.requesting());
    }

    #[test]
    fn header_binds_the_packet_to_one_output() {
        let format = FlitFormat::default();
        let flits = packet(&format, 2, CircuitCommand::None);
        let mut register = RequestRegister::new(0, OUTPUTS, format, false);
        let either = |_: &Flit| bitvec![0, 1, 0, 1, 0];

        let next = register.evaluate(Some(&flits[0]), None, either);
        register.commit(next);
        assert_eq!(register.request().iter_ones().collect::<Vec<_>>(), vec![1, 3]);

        // the header leaves through output 3
        let next = register.evaluate(Some(&flits[0]), Some(3), no_route);
        register.commit(next);
        assert_eq!(register.request().iter_ones().collect::<Vec<_>>(), vec![3]);

        let next = register.evaluate(Some(&flits[1]), Some(3), no_route);
        register.commit(next);
        assert_eq!(register.request().iter_ones().collect::<Vec<_>>(), vec![3]);
        let next = register.evaluate(Some(&flits[2]), Some(3), no_route);
        register.commit(next);
        assert!(!register.requesting());
    }

    #[test]
    fn circuit_outlives_trailers() {
        let _ = env_logger::builder().is_test(true).try_init();
        let format = FlitFormat::default();
        let allocate = packet(&format, 1, CircuitCommand::Allocate);
        let plain = packet(&format, 1, CircuitCommand::None);
        let release = packet(&format, 1, CircuitCommand::Release);
        let mut register = RequestRegister::new(0, OUTPUTS, format, true);

        step(&mut register, Some(&allocate[0]), false, 1);
        assert!(register.circuit_set());
        step(&mut register, Some(&allocate[0]), true, 1);
        step(&mut register, Some(&allocate[1]), true, 1);
        assert!(register.requesting());

        step(&mut register, Some(&plain[0]), true, 4);
        step(&mut register, Some(&plain[1]), true, 4);
        assert!(register.requesting());
        assert_eq!(register.request().first_one(), Some(1));

        step(&mut register, Some(&release[0]), true, 4);
        assert!(!register.circuit_set());
        assert!(register.requesting());
        step(&mut register, Some(&release[1]), true, 4);
        assert!(!register.requesting());
    }

    #[test]
    fn single_flit_release_keeps_the_request() {
        let format = FlitFormat::default();
        let allocate = packet(&format, 0, CircuitCommand::Allocate);
        let release = packet(&format, 0, CircuitCommand::Release);
        let mut register = RequestRegister::new(0, OUTPUTS, format, true);

        step(&mut register, Some(&allocate[0]), false, 1);
        step(&mut register, Some(&allocate[0]), true, 1);
        assert!(register.requesting());

        // the trailer is judged against the circuit latch of its own cycle
        step(&mut register, Some(&release[0]), true, 1);
        assert!(!register.circuit_set());
        assert!(register.requesting());
    }

    #[test]
    fn commands_ignored_without_circuit_switching() {
        let format = FlitFormat::default();
        let allocate = packet(&format, 0, CircuitCommand::Allocate);
        let mut register = RequestRegister::new(0, OUTPUTS, format, false);
        step(&mut register, Some(&allocate[0]), false, 1);
        assert!(!register.circuit_set());
        step(&mut register, Some(&allocate[0]), true, 1);
        assert!(!register.requesting());
    }
}

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

//! The two halves of a router port.

use bitvec::prelude::*;

use crate::arbiter::Arbiter;
use crate::buffer::FlitBuffer;
use crate::flow_control::{InputFlowControl, OutputFlowControl, SenderSignals};
use crate::request::{RequestRegister, RequestState};
use crate::{Error, Flit, FlitFormat, FlitWithValidity, PortConfiguration, RouterConfiguration};

/// Receives one link: flow control, buffer and request register.
#[derive(Clone, Debug)]
pub struct InputPort {
    index: usize,
    flow_control: InputFlowControl,
    buffer: FlitBuffer,
    request: RequestRegister,
}

impl InputPort {
    pub fn new(index: usize, config: &RouterConfiguration) -> Result<Self, Error> {
        let port = config.ports.get(index).ok_or(Error::InvalidPort(index))?;
        if port.input_depth == 0 {
            return Err(Error::InvalidBufferDepth { port: index });
        }
        Ok(Self {
            index,
            flow_control: InputFlowControl::new(config.flow_control),
            buffer: FlitBuffer::new(port.input_depth),
            request: RequestRegister::new(
                index,
                config.port_count(),
                config.format,
                config.circuit_switching,
            ),
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// The upstream `return` wire.
    pub fn return_out(&self) -> bool {
        self.flow_control.return_out()
    }

    /// The flit the request register and the crossbar see.
    pub fn head(&self) -> Option<&Flit> {
        self.buffer.front()
    }

    pub fn request(&self) -> &RequestRegister {
        &self.request
    }

    pub fn buffer(&self) -> &FlitBuffer {
        &self.buffer
    }

    /// Clock edge. `read` pops the head, which must exist.
    pub fn commit(&mut self, link: &FlitWithValidity, read: bool, request: RequestState) {
        let write_ok = self.buffer.write_ok(false);
        let write = if self.flow_control.write(link.valid) {
            Some(link.flit.clone())
        } else {
            None
        };
        self.flow_control.commit(link.valid, write_ok, read);
        self.buffer.commit(write, read);
        self.request.commit(request);
    }
}

/// What an output stage drives in one cycle.
#[derive(Clone, Debug)]
pub struct OutputSignals {
    /// The granted head moves into the output stage.
    pub transfer: bool,
    /// `read_ok` into the flow control, after `hold_send`.
    pub read_ok: bool,
    pub sender: SenderSignals,
    pub link: FlitWithValidity,
}

/// Drives one link: arbiter, buffer and flow control.
#[derive(Clone, Debug)]
pub struct OutputPort {
    index: usize,
    arbiter: Arbiter,
    buffer: FlitBuffer,
    flow_control: OutputFlowControl,
    format: FlitFormat,
}

impl OutputPort {
    pub fn new(index: usize, config: &RouterConfiguration) -> Result<Self, Error> {
        let port: &PortConfiguration = config.ports.get(index).ok_or(Error::InvalidPort(index))?;
        Ok(Self {
            index,
            arbiter: Arbiter::new(config.port_count(), &config.priority)?,
            buffer: FlitBuffer::new(port.output_depth),
            flow_control: OutputFlowControl::new(config.flow_control, port.credits()),
            format: config.format,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn arbiter(&self) -> &Arbiter {
        &self.arbiter
    }

    pub fn buffer(&self) -> &FlitBuffer {
        &self.buffer
    }

    pub fn credits(&self) -> Option<usize> {
        self.flow_control.credits()
    }

    pub fn arbitrate(&self, requests: &BitSlice<usize, Lsb0>) -> Option<usize> {
        self.arbiter.evaluate(requests)
    }

    /// Everything downstream of the grant. `head` is the granted input's
    /// buffer head.
    pub fn evaluate(&self, head: Option<&Flit>, return_in: bool, hold_send: bool) -> OutputSignals {
        let present = head.is_some();
        let ready = self.flow_control.ready(return_in, hold_send);
        let transfer = present && self.buffer.write_ok(ready);
        let read_ok = self.buffer.read_ok(present) && !hold_send;
        let sender = self.flow_control.evaluate(read_ok, return_in);
        let link = match (sender.valid, self.buffer.dout(head)) {
            (true, Some(flit)) => FlitWithValidity::valid(flit.clone()),
            (true, None) => {
                protocol_violation!("output {} drives valid without data", self.index);
                FlitWithValidity::idle(&self.format)
            }
            (false, _) => FlitWithValidity::idle(&self.format),
        };
        OutputSignals {
            transfer,
            read_ok,
            sender,
            link,
        }
    }

    /// Clock edge. `head` is the flit that moved in, if `signals.transfer`.
    pub fn commit(
        &mut self,
        grant: Option<usize>,
        head: Option<&Flit>,
        signals: &OutputSignals,
        return_in: bool,
    ) {
        self.arbiter.commit(grant);
        let write = if signals.transfer { head.cloned() } else { None };
        self.buffer.commit(write, signals.sender.read);
        self.flow_control.commit(signals.read_ok, return_in);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CircuitCommand, FlowControlKind};

    fn config(output_depth: usize) -> RouterConfiguration {
        let mut config = RouterConfiguration::with_ports(2);
        for port in config.ports.iter_mut() {
            port.output_depth = output_depth;
            port.credits = Some(1);
        }
        config
    }

    fn header() -> Flit {
        Flit::header(&FlitFormat::default(), 1, CircuitCommand::None)
    }

    #[test]
    fn input_buffers_link_data() {
        let config = config(1);
        let mut input = InputPort::new(0, &config).unwrap();
        let idle = RequestState {
            request: bitvec![0, 0],
            circuit: false,
        };
        input.commit(&FlitWithValidity::valid(header()), false, idle.clone());
        assert_eq!(input.head(), Some(&header()));
        assert!(!input.return_out());
        input.commit(&FlitWithValidity::idle(&config.format), true, idle);
        assert!(input.head().is_none());
        // credit comes back one cycle after the read
        assert!(input.return_out());
    }

    #[test]
    fn output_stage_registers() {
        let config = config(1);
        let mut output = OutputPort::new(1, &config).unwrap();
        let head = header();

        let signals = output.evaluate(Some(&head), false, false);
        assert!(signals.transfer);
        assert!(!signals.link.valid);
        output.commit(Some(0), Some(&head), &signals, false);
        assert_eq!(output.buffer().occupancy(), 1);

        let signals = output.evaluate(None, false, false);
        assert!(signals.sender.valid);
        assert_eq!(signals.link.as_option(), Some(&head));
        output.commit(None, None, &signals, false);
        assert_eq!(output.credits(), Some(0));
        assert!(output.buffer().is_empty());
    }

    #[test]
    fn pass_through_output() {
        let config = config(0);
        let mut output = OutputPort::new(0, &config).unwrap();
        let head = header();
        let signals = output.evaluate(Some(&head), false, false);
        assert!(signals.transfer);
        assert_eq!(signals.link.as_option(), Some(&head));
        output.commit(Some(1), Some(&head), &signals, false);
        assert_eq!(output.credits(), Some(0));

        // out of credits: the head stays where it is
        let signals = output.evaluate(Some(&head), false, false);
        assert!(!signals.transfer);
        assert!(!signals.link.valid);
    }

    #[test]
    fn hold_send_blocks_the_link() {
        let config = config(1);
        let mut output = OutputPort::new(0, &config).unwrap();
        let head = header();
        let signals = output.evaluate(Some(&head), false, true);
        output.commit(Some(1), Some(&head), &signals, false);
        let signals = output.evaluate(None, false, true);
        assert!(!signals.link.valid);
        assert!(!signals.transfer);
    }

    #[test]
    fn handshake_ports() {
        let mut config = config(1);
        config.flow_control = FlowControlKind::Handshake;
        let input = InputPort::new(0, &config).unwrap();
        assert!(!input.return_out());
        let output = OutputPort::new(0, &config).unwrap();
        assert_eq!(output.credits(), None);
    }

    #[test]
    fn missing_port() {
        let config = config(1);
        assert!(matches!(InputPort::new(2, &config), Err(Error::InvalidPort(2))));
        assert!(matches!(OutputPort::new(5, &config), Err(Error::InvalidPort(5))));
    }
}

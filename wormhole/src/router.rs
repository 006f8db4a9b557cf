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

//! A wormhole router: N input ports switched onto N output ports.
//!
//! Every clock cycle is split in two phases. [Router::evaluate] computes all
//! combinational signals from the current register values and the wires
//! arriving at the router; [Router::commit] then advances every register at
//! once. Nothing observes a value committed in the same cycle, so routers
//! wired into a network can be evaluated in any order.

use bitvec::prelude::*;
use log::trace;

use crate::arbiter::ArbiterState;
use crate::ports::{InputPort, OutputPort, OutputSignals};
use crate::request::RequestState;
use crate::routing::{Coordinates, RoutingFunction};
use crate::{Cycle, Error, FlitFormat, FlitWithValidity, RouterConfiguration};

/// The wires arriving at a router in one cycle.
#[derive(Clone, Debug)]
pub struct RouterInputs {
    /// Link data per input port.
    pub forward: Vec<FlitWithValidity>,
    /// `return` per output port, driven by the downstream receiver.
    pub returns: Vec<bool>,
}

impl RouterInputs {
    pub fn idle(format: &FlitFormat, ports: usize) -> Self {
        Self {
            forward: vec![FlitWithValidity::idle(format); ports],
            returns: vec![false; ports],
        }
    }
}

/// Combinational state of one cycle, consumed by [Router::commit].
#[derive(Clone, Debug)]
pub struct RouterEvaluation {
    grants: Vec<Option<usize>>,
    outputs: Vec<OutputSignals>,
    /// Per input, the output its head moves to.
    taken: Vec<Option<usize>>,
    requests: Vec<RequestState>,
}

impl RouterEvaluation {
    /// Link data driven on the output port.
    pub fn forward(&self, port: usize) -> &FlitWithValidity {
        &self.outputs[port].link
    }

    pub fn grant(&self, output: usize) -> Option<usize> {
        self.grants[output]
    }
}

pub struct Router {
    coordinates: Coordinates,
    format: FlitFormat,
    inputs: Vec<InputPort>,
    outputs: Vec<OutputPort>,
    routing: Box<dyn RoutingFunction>,
    hold_send: BitVec<usize, Lsb0>,
    cycle: Cycle,
}

impl Router {
    /// A router using the configured routing algorithm.
    pub fn new(config: &RouterConfiguration, coordinates: Coordinates) -> Result<Self, Error> {
        Self::build(config, coordinates, config.routing.build(config.format))
    }

    pub fn with_routing<R>(
        config: &RouterConfiguration,
        coordinates: Coordinates,
        routing: R,
    ) -> Result<Self, Error>
    where
        R: RoutingFunction + 'static,
    {
        Self::build(config, coordinates, Box::new(routing))
    }

    fn build(
        config: &RouterConfiguration,
        coordinates: Coordinates,
        routing: Box<dyn RoutingFunction>,
    ) -> Result<Self, Error> {
        config.validate()?;
        let ports = config.port_count();
        let inputs = (0..ports)
            .map(|index| InputPort::new(index, config))
            .collect::<Result<Vec<_>, _>>()?;
        let outputs = (0..ports)
            .map(|index| OutputPort::new(index, config))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            coordinates,
            format: config.format,
            inputs,
            outputs,
            routing,
            hold_send: BitVec::repeat(false, ports),
            cycle: 0,
        })
    }

    pub fn coordinates(&self) -> Coordinates {
        self.coordinates
    }

    pub fn format(&self) -> &FlitFormat {
        &self.format
    }

    pub fn port_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn cycle(&self) -> Cycle {
        self.cycle
    }

    /// Stops `port` from starting new link transfers.
    pub fn set_hold_send(&mut self, port: usize, hold: bool) -> Result<(), Error> {
        if port >= self.port_count() {
            return Err(Error::InvalidPort(port));
        }
        self.hold_send.set(port, hold);
        Ok(())
    }

    // The observers below index like slices: they panic if the port is out
    // of range.

    /// # Panics
    ///
    /// If `port` is not a port of this router.
    pub fn hold_send(&self, port: usize) -> bool {
        self.hold_send[port]
    }

    /// `return` driven upstream by every input port. Registered, so it may
    /// be read before anything is evaluated.
    pub fn returns(&self) -> Vec<bool> {
        self.inputs.iter().map(|input| input.return_out()).collect()
    }

    /// The registered request of `input`.
    ///
    /// # Panics
    ///
    /// If `input` is not a port of this router.
    pub fn request(&self, input: usize) -> &BitSlice<usize, Lsb0> {
        self.inputs[input].request().request()
    }

    pub fn circuit_set(&self, input: usize) -> bool {
        self.inputs[input].request().circuit_set()
    }

    pub fn input_occupancy(&self, input: usize) -> usize {
        self.inputs[input].buffer().occupancy()
    }

    pub fn output_occupancy(&self, output: usize) -> usize {
        self.outputs[output].buffer().occupancy()
    }

    pub fn credits(&self, output: usize) -> Option<usize> {
        self.outputs[output].credits()
    }

    pub fn arbiter_state(&self, output: usize) -> ArbiterState {
        self.outputs[output].arbiter().state()
    }

    pub fn priority(&self, output: usize) -> usize {
        self.outputs[output].arbiter().priority().index()
    }

    /// First phase of a cycle. Pure.
    pub fn evaluate(&self, wires: &RouterInputs) -> RouterEvaluation {
        let ports = self.port_count();
        debug_assert_eq!(wires.forward.len(), ports);
        debug_assert_eq!(wires.returns.len(), ports);

        let heads: Vec<_> = self.inputs.iter().map(|input| input.head()).collect();
        let mut grants: Vec<Option<usize>> = self
            .outputs
            .iter()
            .map(|output| {
                let requests: BitVec<usize, Lsb0> = self
                    .inputs
                    .iter()
                    .map(|input| input.request().request()[output.index()])
                    .collect();
                output.arbitrate(&requests)
            })
            .collect();

        // an input feeds at most one output: the one already holding it,
        // otherwise the lowest-index one
        for input in 0..ports {
            let granting: Vec<usize> = (0..ports)
                .filter(|&output| grants[output] == Some(input))
                .collect();
            if granting.len() > 1 {
                let keep = granting
                    .iter()
                    .copied()
                    .find(|&output| {
                        self.outputs[output].arbiter().state() == ArbiterState::Granting(input)
                    })
                    .unwrap_or(granting[0]);
                trace!(
                    "{}: input {} granted by {:?}, keeping {}",
                    self.coordinates,
                    input,
                    granting,
                    keep
                );
                for output in granting.into_iter().filter(|&output| output != keep) {
                    grants[output] = None;
                }
            }
        }

        let outputs: Vec<OutputSignals> = self
            .outputs
            .iter()
            .zip(grants.iter())
            .map(|(output, grant)| {
                let head = grant.and_then(|input| heads[input]);
                output.evaluate(
                    head,
                    wires.returns[output.index()],
                    self.hold_send[output.index()],
                )
            })
            .collect();

        // the output each input's head leaves through
        let mut taken: Vec<Option<usize>> = vec![None; ports];
        for (output, (grant, signals)) in grants.iter().zip(outputs.iter()).enumerate() {
            if let (Some(input), true) = (grant, signals.transfer) {
                taken[*input] = Some(output);
            }
        }

        let requests = self
            .inputs
            .iter()
            .map(|input| {
                let port = input.index();
                input.request().evaluate(heads[port], taken[port], |header| {
                    self.routing.route(header, self.coordinates, port)
                })
            })
            .collect();

        RouterEvaluation {
            grants,
            outputs,
            taken,
            requests,
        }
    }

    /// Second phase: the clock edge.
    pub fn commit(&mut self, evaluation: RouterEvaluation, wires: &RouterInputs) {
        let RouterEvaluation {
            grants,
            outputs,
            taken,
            requests,
        } = evaluation;

        // outputs first, they copy the input heads that are about to pop
        for ((output, grant), signals) in
            self.outputs.iter_mut().zip(grants).zip(outputs.iter())
        {
            let head = grant.and_then(|input| self.inputs[input].head());
            let return_in = wires.returns[output.index()];
            output.commit(grant, head, signals, return_in);
        }
        for (input, request) in self.inputs.iter_mut().zip(requests) {
            let port = input.index();
            input.commit(&wires.forward[port], taken[port].is_some(), request);
        }
        trace!("{} cycle {} taken {:?}", self.coordinates, self.cycle, taken);
        self.cycle += 1;
    }

    /// One full cycle; returns the link data driven on every output.
    pub fn tick(&mut self, wires: &RouterInputs) -> Vec<FlitWithValidity> {
        let evaluation = self.evaluate(wires);
        let forward = evaluation.outputs.iter().map(|signals| signals.link.clone()).collect();
        self.commit(evaluation, wires);
        forward
    }
}

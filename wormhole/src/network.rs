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

//! Routers wired into a 2D mesh, with an endpoint on every local port.

use itertools::iproduct;
use log::{debug, info};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::buffer::FlitBuffer;
use crate::flow_control::{InputFlowControl, OutputFlowControl, SenderSignals};
use crate::router::{Router, RouterEvaluation, RouterInputs};
use crate::routing::{CardinalPort, Coordinates};
use crate::{
    CircuitCommand, Cycle, Error, Flit, FlitFormat, FlitWithValidity, FlowControlKind,
    NetworkConfiguration, Packet, RouterConfiguration,
};

/// A packet that left the network.
#[derive(Clone, Debug)]
pub struct Delivery {
    pub packet: Rc<Packet>,
    pub cycle: Cycle,
}

impl Delivery {
    pub fn latency(&self) -> Cycle {
        self.cycle - self.packet.creation_cycle
    }
}

/// Combinational state of an endpoint for one cycle.
#[derive(Clone, Debug)]
pub struct InterfaceEvaluation {
    /// Link data towards the router.
    pub link: FlitWithValidity,
    read_ok: bool,
    sender: SenderSignals,
    drain: bool,
}

/// Injects packets into one router port and ejects packets from it.
///
/// The source side queues flits without bound and sends them under the
/// link's flow control. The sink side drains one flit per cycle and checks
/// that packets arrive whole and one at a time.
#[derive(Clone, Debug)]
pub struct NetworkInterface {
    port: usize,
    format: FlitFormat,
    queue: VecDeque<Flit>,
    sender: OutputFlowControl,
    receiver: InputFlowControl,
    sink: FlitBuffer,
    receiving: Option<Rc<Packet>>,
    delivered: Vec<Delivery>,
    cycle: Cycle,
}

impl NetworkInterface {
    /// An endpoint attached to `port` of a router built from `config`.
    pub fn new(config: &RouterConfiguration, port: usize) -> Result<Self, Error> {
        let ports = config.ports.get(port).ok_or(Error::InvalidPort(port))?;
        Ok(Self {
            port,
            format: config.format,
            queue: VecDeque::new(),
            sender: OutputFlowControl::new(config.flow_control, ports.input_depth),
            receiver: InputFlowControl::new(config.flow_control),
            sink: FlitBuffer::new(ports.credits().max(1)),
            receiving: None,
            delivered: Vec::new(),
            cycle: 0,
        })
    }

    pub fn enqueue(&mut self, packet: &Rc<Packet>, command: CircuitCommand) {
        self.queue.extend(packet.to_flits(&self.format, command));
    }

    /// Flits waiting to be sent.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn sink_occupancy(&self) -> usize {
        self.sink.occupancy()
    }

    /// `return` towards the router output feeding the sink.
    pub fn return_out(&self) -> bool {
        self.receiver.return_out()
    }

    pub fn delivered(&self) -> &[Delivery] {
        &self.delivered
    }

    pub fn evaluate(&self, return_in: bool) -> InterfaceEvaluation {
        let read_ok = !self.queue.is_empty();
        let sender = self.sender.evaluate(read_ok, return_in);
        let link = match (sender.valid, self.queue.front()) {
            (true, Some(flit)) => FlitWithValidity::valid(flit.clone()),
            (true, None) => {
                protocol_violation!("endpoint {} sends valid without data", self.port);
                FlitWithValidity::idle(&self.format)
            }
            (false, _) => FlitWithValidity::idle(&self.format),
        };
        InterfaceEvaluation {
            link,
            read_ok,
            sender,
            drain: !self.sink.is_empty(),
        }
    }

    /// `return_in` must be the value given to [Self::evaluate]; `link_in`
    /// is the data driven by the router this cycle.
    pub fn commit(
        &mut self,
        evaluation: InterfaceEvaluation,
        return_in: bool,
        link_in: &FlitWithValidity,
    ) {
        self.sender.commit(evaluation.read_ok, return_in);
        if evaluation.sender.read {
            self.queue.pop_front();
        }

        let drained = if evaluation.drain {
            self.sink.front().cloned()
        } else {
            None
        };
        let write = if self.receiver.write(link_in.valid) {
            Some(link_in.flit.clone())
        } else {
            None
        };
        self.receiver
            .commit(link_in.valid, self.sink.write_ok(false), evaluation.drain);
        self.sink.commit(write, evaluation.drain);
        if let Some(flit) = drained {
            self.receive(flit);
        }
        self.cycle += 1;
    }

    fn receive(&mut self, flit: Flit) {
        if flit.is_bop() {
            if let Some(packet) = &self.receiving {
                protocol_violation!(
                    "endpoint {}: packet {} cut short by a new header",
                    self.port,
                    packet.id
                );
            }
            self.receiving = flit.packet().cloned();
        } else {
            match (&self.receiving, flit.packet()) {
                (None, _) => {
                    protocol_violation!("endpoint {}: {:?} outside a packet", self.port, flit)
                }
                (Some(current), Some(packet)) if !Rc::ptr_eq(current, packet) => {
                    protocol_violation!(
                        "endpoint {}: packet {} interleaved with packet {}",
                        self.port,
                        current.id,
                        packet.id
                    )
                }
                _ => {}
            }
        }
        if flit.is_eop() {
            if let Some(packet) = self.receiving.take() {
                debug!(
                    "endpoint {} received packet {} at cycle {}",
                    self.port, packet.id, self.cycle
                );
                self.delivered.push(Delivery {
                    packet,
                    cycle: self.cycle,
                });
            }
        }
    }
}

/// `columns` x `rows` routers, linked north/east/south/west.
///
/// North is increasing y. Node `(x, y)` is addressed by its coordinates
/// packed into the header address field.
pub struct Mesh {
    columns: usize,
    rows: usize,
    format: FlitFormat,
    routers: Vec<Router>,
    interfaces: Vec<NetworkInterface>,
    next_packet: usize,
    cycle: Cycle,
}

impl Mesh {
    pub fn new(config: &NetworkConfiguration) -> Result<Self, Error> {
        let router = &config.router;
        router.validate()?;
        if router.port_count() != CardinalPort::COUNT {
            return Err(Error::InvalidPortCount(router.port_count()));
        }
        if config.columns == 0 || config.rows == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "empty {}x{} mesh",
                config.columns, config.rows
            )));
        }
        // the farthest node must still be addressable
        Coordinates::new(config.columns - 1, config.rows - 1).to_address(&router.format)?;
        if router.flow_control == FlowControlKind::Credit {
            for port in CardinalPort::ALL {
                let receiving = router.ports[port.opposite().index()].input_depth;
                if router.ports[port.index()].credits() > receiving {
                    return Err(Error::InvalidCredits { port: port.index() });
                }
            }
        }

        let routers = iproduct!(0..config.rows, 0..config.columns)
            .map(|(y, x)| Router::new(router, Coordinates::new(x, y)))
            .collect::<Result<Vec<_>, _>>()?;
        let interfaces = (0..config.node_count())
            .map(|_| NetworkInterface::new(router, CardinalPort::Local.index()))
            .collect::<Result<Vec<_>, _>>()?;
        info!(
            "{}x{} mesh, {} flow control, {} priority, {:?} routing",
            config.columns, config.rows, router.flow_control, router.priority, router.routing
        );
        Ok(Self {
            columns: config.columns,
            rows: config.rows,
            format: router.format,
            routers,
            interfaces,
            next_packet: 0,
            cycle: 0,
        })
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cycle(&self) -> Cycle {
        self.cycle
    }

    pub fn nodes(&self) -> impl Iterator<Item = Coordinates> + '_ {
        iproduct!(0..self.rows, 0..self.columns).map(|(y, x)| Coordinates::new(x, y))
    }

    fn node(&self, coordinates: Coordinates) -> Result<usize, Error> {
        if coordinates.x >= self.columns || coordinates.y >= self.rows {
            return Err(Error::InvalidCoordinates {
                x: coordinates.x,
                y: coordinates.y,
            });
        }
        Ok(coordinates.y * self.columns + coordinates.x)
    }

    /// The router on the other side of `port`, if there is one.
    fn neighbour(&self, node: usize, port: CardinalPort) -> Option<usize> {
        let (x, y) = (node % self.columns, node / self.columns);
        match port {
            CardinalPort::Local => None,
            CardinalPort::North if y + 1 < self.rows => Some(node + self.columns),
            CardinalPort::East if x + 1 < self.columns => Some(node + 1),
            CardinalPort::South if y > 0 => Some(node - self.columns),
            CardinalPort::West if x > 0 => Some(node - 1),
            _ => None,
        }
    }

    pub fn router(&self, coordinates: Coordinates) -> Result<&Router, Error> {
        let node = self.node(coordinates)?;
        Ok(&self.routers[node])
    }

    pub fn router_mut(&mut self, coordinates: Coordinates) -> Result<&mut Router, Error> {
        let node = self.node(coordinates)?;
        Ok(&mut self.routers[node])
    }

    pub fn delivered(&self, coordinates: Coordinates) -> Result<&[Delivery], Error> {
        let node = self.node(coordinates)?;
        Ok(self.interfaces[node].delivered())
    }

    pub fn delivered_count(&self) -> usize {
        self.interfaces.iter().map(|ni| ni.delivered().len()).sum()
    }

    /// Packets created so far.
    pub fn sent_count(&self) -> usize {
        self.next_packet
    }

    pub fn send(
        &mut self,
        source: Coordinates,
        destination: Coordinates,
        payload_len: usize,
    ) -> Result<Rc<Packet>, Error> {
        self.send_with(source, destination, payload_len, CircuitCommand::None)
    }

    pub fn send_with(
        &mut self,
        source: Coordinates,
        destination: Coordinates,
        payload_len: usize,
        command: CircuitCommand,
    ) -> Result<Rc<Packet>, Error> {
        let node = self.node(source)?;
        self.node(destination)?;
        if source == destination {
            return Err(Error::Loopback {
                x: source.x,
                y: source.y,
            });
        }
        let address = destination.to_address(&self.format)?;
        let packet = Rc::new(Packet::new(
            self.next_packet,
            address,
            payload_len,
            self.cycle,
        ));
        self.next_packet += 1;
        debug!(
            "packet {} {} -> {}, {} flits",
            packet.id,
            source,
            destination,
            packet.flit_count()
        );
        self.interfaces[node].enqueue(&packet, command);
        Ok(packet)
    }

    /// One clock cycle of the whole network.
    pub fn tick(&mut self) {
        let local = CardinalPort::Local.index();
        let returns: Vec<Vec<bool>> = self.routers.iter().map(|router| router.returns()).collect();
        let sources: Vec<_> = self
            .interfaces
            .iter()
            .zip(returns.iter())
            .map(|(ni, returns)| ni.evaluate(returns[local]))
            .collect();

        let mut wires: Vec<RouterInputs> = (0..self.routers.len())
            .map(|node| {
                let mut wires = RouterInputs::idle(&self.format, CardinalPort::COUNT);
                for port in CardinalPort::ALL {
                    wires.returns[port.index()] = match port {
                        CardinalPort::Local => self.interfaces[node].return_out(),
                        _ => self
                            .neighbour(node, port)
                            .map_or(false, |other| returns[other][port.opposite().index()]),
                    };
                }
                wires
            })
            .collect();
        let evaluations: Vec<RouterEvaluation> = self
            .routers
            .iter()
            .zip(wires.iter())
            .map(|(router, wires)| router.evaluate(wires))
            .collect();

        for (node, wires) in wires.iter_mut().enumerate() {
            for port in CardinalPort::ALL {
                let link = match port {
                    CardinalPort::Local => Some(sources[node].link.clone()),
                    _ => self
                        .neighbour(node, port)
                        .map(|other| evaluations[other].forward(port.opposite().index()).clone()),
                };
                if let Some(link) = link {
                    wires.forward[port.index()] = link;
                }
            }
        }

        for (node, ((ni, source), evaluation)) in self
            .interfaces
            .iter_mut()
            .zip(sources)
            .zip(evaluations.iter())
            .enumerate()
        {
            ni.commit(source, returns[node][local], evaluation.forward(local));
        }
        for ((router, evaluation), wires) in
            self.routers.iter_mut().zip(evaluations).zip(wires.iter())
        {
            router.commit(evaluation, wires);
        }
        self.cycle += 1;
    }

    pub fn run(&mut self, cycles: usize) {
        for _ in 0..cycles {
            self.tick();
        }
    }

    /// Runs until every packet sent so far has been delivered, for at most
    /// `limit` cycles. Returns whether the network drained.
    pub fn drain(&mut self, limit: usize) -> bool {
        for _ in 0..limit {
            if self.delivered_count() == self.sent_count() {
                return true;
            }
            self.tick();
        }
        self.delivered_count() == self.sent_count()
    }
}

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

//! Cycle-accurate model of the port-switching pipeline of a wormhole
//! network-on-chip router.
//!
//! Flits enter through an input port (flow control, buffer, request
//! register), win an output through its arbiter, and leave through the
//! output's buffer and flow control. Every component is stepped with an
//! explicit `evaluate` / `commit` pair, see [Router].

#[macro_use]
mod error;

mod arbiter;
mod buffer;
mod config;
mod flit;
mod flow_control;
mod network;
mod ports;
mod priority;
mod request;
mod router;
mod routing;

// type to use for cycles
pub type Cycle = usize;

pub use crate::arbiter::{programmable_priority_encoder, Arbiter, ArbiterState};
pub use crate::buffer::{FlitBuffer, WriteStatus};
pub use crate::config::{NetworkConfiguration, PortConfiguration, RouterConfiguration};
pub use crate::error::Error;
pub use crate::flit::{CircuitCommand, Data, Flit, FlitFormat, FlitWithValidity, Packet};
pub use crate::flow_control::{
    CreditReceiver, CreditSender, FlowControlKind, HandshakeReceiver, HandshakeSender,
    HandshakeState, InputFlowControl, OutputFlowControl, SenderSignals,
};
pub use crate::network::{Delivery, InterfaceEvaluation, Mesh, NetworkInterface};
pub use crate::ports::{InputPort, OutputPort, OutputSignals};
pub use crate::priority::{OneHot, PriorityGenerator, PriorityPolicy};
pub use crate::request::{RequestRegister, RequestState};
pub use crate::router::{Router, RouterEvaluation, RouterInputs};
pub use crate::routing::{
    CardinalPort, Coordinates, RoutingAlgorithm, RoutingFunction, WestFirstRouting, XyRouting,
};

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

//! Routing functions: header -> direction vector.
//!
//! The router only depends on [RoutingFunction]; the mesh algorithms here
//! are interchangeable strategies selected by [RoutingAlgorithm].

use bitvec::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Flit, FlitFormat};

/// Position of a router in a 2D mesh.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Deserialize, Serialize)]
pub struct Coordinates {
    pub x: usize,
    pub y: usize,
}

impl Coordinates {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// x in the low half of the address field, y in the high half.
    pub fn to_address(&self, format: &FlitFormat) -> Result<usize, Error> {
        let x_bits = format.address_width / 2;
        let y_bits = format.address_width - x_bits;
        if self.x >= 1 << x_bits || self.y >= 1 << y_bits {
            return Err(Error::InvalidCoordinates {
                x: self.x,
                y: self.y,
            });
        }
        Ok(self.x | (self.y << x_bits))
    }

    pub fn from_address(address: usize, format: &FlitFormat) -> Self {
        let x_bits = format.address_width / 2;
        Self {
            x: address & ((1 << x_bits) - 1),
            y: address >> x_bits,
        }
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Port numbering of a mesh router.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CardinalPort {
    Local = 0,
    North = 1,
    East = 2,
    South = 3,
    West = 4,
}

impl CardinalPort {
    pub const COUNT: usize = 5;
    pub const ALL: [CardinalPort; 5] = [
        Self::Local,
        Self::North,
        Self::East,
        Self::South,
        Self::West,
    ];

    /// The port a link leaving through `self` arrives on.
    pub fn opposite(self) -> Self {
        match self {
            Self::Local => Self::Local,
            Self::North => Self::South,
            Self::East => Self::West,
            Self::South => Self::North,
            Self::West => Self::East,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Single-candidate direction vector for this port.
    pub fn direction(self) -> BitVec<usize, Lsb0> {
        let mut bits = BitVec::repeat(false, Self::COUNT);
        bits.set(self.index(), true);
        bits
    }
}

impl From<CardinalPort> for usize {
    fn from(port: CardinalPort) -> usize {
        port.index()
    }
}

/// Decides where a header goes.
///
/// Must be pure: called combinationally, possibly several times per cycle
/// for the same header.
pub trait RoutingFunction {
    fn route(&self, header: &Flit, local: Coordinates, port: usize) -> BitVec<usize, Lsb0>;
}

impl<F> RoutingFunction for F
where
    F: Fn(&Flit, Coordinates, usize) -> BitVec<usize, Lsb0>,
{
    fn route(&self, header: &Flit, local: Coordinates, port: usize) -> BitVec<usize, Lsb0> {
        self(header, local, port)
    }
}

/// Dimension ordered routing: all X hops, then all Y hops.
#[derive(Clone, Debug)]
pub struct XyRouting {
    format: FlitFormat,
}

impl XyRouting {
    pub fn new(format: FlitFormat) -> Self {
        Self { format }
    }
}

impl RoutingFunction for XyRouting {
    fn route(&self, header: &Flit, local: Coordinates, _port: usize) -> BitVec<usize, Lsb0> {
        let dest = Coordinates::from_address(header.address(&self.format), &self.format);
        let port = match (dest.x.cmp(&local.x), dest.y.cmp(&local.y)) {
            (Ordering::Greater, _) => CardinalPort::East,
            (Ordering::Less, _) => CardinalPort::West,
            (Ordering::Equal, Ordering::Greater) => CardinalPort::North,
            (Ordering::Equal, Ordering::Less) => CardinalPort::South,
            (Ordering::Equal, Ordering::Equal) => CardinalPort::Local,
        };
        port.direction()
    }
}

/// West-first turn model: every west hop first, then the Y hops, then east.
#[derive(Clone, Debug)]
pub struct WestFirstRouting {
    format: FlitFormat,
}

impl WestFirstRouting {
    pub fn new(format: FlitFormat) -> Self {
        Self { format }
    }
}

impl RoutingFunction for WestFirstRouting {
    fn route(&self, header: &Flit, local: Coordinates, _port: usize) -> BitVec<usize, Lsb0> {
        let dest = Coordinates::from_address(header.address(&self.format), &self.format);
        let port = if dest.x < local.x {
            CardinalPort::West
        } else {
            match dest.y.cmp(&local.y) {
                Ordering::Greater => CardinalPort::North,
                Ordering::Less => CardinalPort::South,
                Ordering::Equal if dest.x > local.x => CardinalPort::East,
                Ordering::Equal => CardinalPort::Local,
            }
        };
        port.direction()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingAlgorithm {
    Xy,
    WestFirst,
}

impl Default for RoutingAlgorithm {
    fn default() -> Self {
        Self::Xy
    }
}

impl RoutingAlgorithm {
    pub fn build(&self, format: FlitFormat) -> Box<dyn RoutingFunction> {
        match self {
            Self::Xy => Box::new(XyRouting::new(format)),
            Self::WestFirst => Box::new(WestFirstRouting::new(format)),
        }
    }
}

impl FromStr for RoutingAlgorithm {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            "xy" => Ok(Self::Xy),
            "west-first" | "west_first" | "wf" => Ok(Self::WestFirst),
            _ => Err(Error::InvalidConfiguration(format!(
                "unknown routing algorithm '{}'",
                name
            ))),
        }
    }
}

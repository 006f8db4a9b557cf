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

//! Flits, packets and the header bit layout.
//!
//! ```text
//!  width-1  width-2             address_width+2   address_width        0
//! +-------+--------+----- ... ----+----------------+--------- ... -----+
//! |  EOP  |  BOP   |   payload    | circuit command|  destination addr |
//! +-------+--------+----- ... ----+----------------+--------- ... -----+
//! ```

use bitvec::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

use crate::{Cycle, Error};

/// fixed-size block of bits carried by one flit
pub type Data = BitBox<usize, Lsb0>;

/// Width of the circuit-switching command field of a header.
pub const CIRCUIT_COMMAND_WIDTH: usize = 2;

/// Number of framing bits (BOP, EOP) at the top of every flit.
pub const FRAMING_WIDTH: usize = 2;

/// Widest address field that fits the routing decoders.
const MAX_ADDRESS_WIDTH: usize = 32;

/// Bit layout shared by every flit on a network.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct FlitFormat {
    /// Total flit width in bits, framing included.
    pub width: usize,
    /// Width of the destination address field in the low-order bits.
    pub address_width: usize,
}

impl FlitFormat {
    pub fn new(width: usize, address_width: usize) -> Result<Self, Error> {
        let format = Self {
            width,
            address_width,
        };
        format.validate()?;
        Ok(format)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.address_width == 0
            || self.address_width > MAX_ADDRESS_WIDTH
            || self.width < self.address_width + CIRCUIT_COMMAND_WIDTH + FRAMING_WIDTH
        {
            return Err(Error::InvalidFlitFormat {
                width: self.width,
                address_width: self.address_width,
            });
        }
        Ok(())
    }

    pub fn bop_bit(&self) -> usize {
        self.width - 2
    }

    pub fn eop_bit(&self) -> usize {
        self.width - 1
    }

    fn command_bits(&self) -> std::ops::Range<usize> {
        self.address_width..self.address_width + CIRCUIT_COMMAND_WIDTH
    }

    /// Bits available below the framing bits.
    fn payload_bits(&self) -> std::ops::Range<usize> {
        0..self.bop_bit()
    }
}

impl Default for FlitFormat {
    fn default() -> Self {
        Self {
            width: 34,
            address_width: 8,
        }
    }
}

/// Circuit-switching sub-command carried by a header.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CircuitCommand {
    None,
    Allocate,
    Release,
}

impl CircuitCommand {
    fn encode(self) -> u8 {
        match self {
            Self::None => 0b00,
            Self::Allocate => 0b01,
            Self::Release => 0b10,
        }
    }

    fn decode(bits: u8) -> Self {
        match bits {
            0b01 => Self::Allocate,
            0b10 => Self::Release,
            // 0b11 is reserved
            _ => Self::None,
        }
    }
}

/// A whole multi-flit transfer.
///
/// Owned by whoever creates it; flits only hold a shared reference for
/// bookkeeping, the switching pipeline never looks inside.
#[derive(Clone, Debug, PartialEq)]
pub struct Packet {
    pub id: usize,
    /// destination address, as encoded in the header
    pub destination: usize,
    pub creation_cycle: Cycle,
    pub deadline: Option<Cycle>,
    /// required bandwidth in flits per 100 cycles
    pub bandwidth: usize,
    /// number of flits following the header
    pub payload_len: usize,
}

impl Packet {
    pub fn new(id: usize, destination: usize, payload_len: usize, creation_cycle: Cycle) -> Self {
        Self {
            id,
            destination,
            creation_cycle,
            deadline: None,
            bandwidth: 0,
            payload_len,
        }
    }

    /// Total number of flits on the wire, header included.
    pub fn flit_count(&self) -> usize {
        self.payload_len + 1
    }

    /// Serializes the packet into its flit sequence.
    ///
    /// The header carries BOP, the destination and `command`; payload flits
    /// carry `(id << 16) | index` truncated to the payload bits; the last
    /// flit carries EOP. A packet without payload is a single flit with both
    /// framing bits set.
    pub fn to_flits(self: &Rc<Self>, format: &FlitFormat, command: CircuitCommand) -> Vec<Flit> {
        let mut flits = Vec::with_capacity(self.flit_count());
        let mut header = Flit::header(format, self.destination, command).with_packet(self);
        if self.payload_len == 0 {
            header.set_eop(format);
        }
        flits.push(header);
        for index in 1..=self.payload_len {
            let word = ((self.id as u64) << 16) | index as u64;
            let mut flit = Flit::payload(format, word).with_packet(self);
            if index == self.payload_len {
                flit.set_eop(format);
            }
            flits.push(flit);
        }
        flits
    }
}

/// The atomic transfer unit on a link.
#[derive(Clone)]
pub struct Flit {
    data: Data,
    packet: Option<Rc<Packet>>,
}

impl Flit {
    pub fn new(data: Data) -> Self {
        Self { data, packet: None }
    }

    /// An all-zero flit, driven on links that carry nothing valid.
    pub fn idle(format: &FlitFormat) -> Self {
        Self::new(BitVec::repeat(false, format.width).into_boxed_bitslice())
    }

    pub fn header(format: &FlitFormat, destination: usize, command: CircuitCommand) -> Self {
        let mut flit = Self::idle(format);
        flit.data[..format.address_width].store_le(destination);
        flit.data[format.command_bits()].store_le(command.encode());
        flit.data.set(format.bop_bit(), true);
        flit
    }

    pub fn payload(format: &FlitFormat, word: u64) -> Self {
        let mut flit = Self::idle(format);
        let bits = format.payload_bits();
        let len = bits.len().min(u64::BITS as usize);
        flit.data[..len].store_le(word);
        flit
    }

    pub fn with_packet(mut self, packet: &Rc<Packet>) -> Self {
        self.packet = Some(Rc::clone(packet));
        self
    }

    pub fn set_eop(&mut self, format: &FlitFormat) {
        self.data.set(format.eop_bit(), true);
    }

    pub fn data(&self) -> &BitSlice<usize, Lsb0> {
        self.data.as_bitslice()
    }

    pub fn packet(&self) -> Option<&Rc<Packet>> {
        self.packet.as_ref()
    }

    pub fn width(&self) -> usize {
        self.data.len()
    }

    pub fn is_bop(&self) -> bool {
        self.data[self.width() - 2]
    }

    pub fn is_eop(&self) -> bool {
        self.data[self.width() - 1]
    }

    pub fn address(&self, format: &FlitFormat) -> usize {
        self.data[..format.address_width].load_le::<usize>()
    }

    pub fn circuit_command(&self, format: &FlitFormat) -> CircuitCommand {
        CircuitCommand::decode(self.data[format.command_bits()].load_le::<u8>())
    }

    /// The low-order payload word (at most 64 bits).
    pub fn word(&self) -> u64 {
        let len = (self.width() - FRAMING_WIDTH).min(u64::BITS as usize);
        self.data[..len].load_le::<u64>()
    }
}

// Flits compare by wire content only; the packet reference is bookkeeping.
impl PartialEq for Flit {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl fmt::Debug for Flit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match (self.is_bop(), self.is_eop()) {
            (true, true) => "H+T",
            (true, false) => "H",
            (false, true) => "T",
            (false, false) => "P",
        };
        write!(f, "Flit({} {:#x}", kind, self.word())?;
        if let Some(packet) = &self.packet {
            write!(f, " pkt {}", packet.id)?;
        }
        write!(f, ")")
    }
}

/// What one link carries downstream in a cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct FlitWithValidity {
    pub flit: Flit,
    pub valid: bool,
}

impl FlitWithValidity {
    pub fn idle(format: &FlitFormat) -> Self {
        Self {
            flit: Flit::idle(format),
            valid: false,
        }
    }

    pub fn valid(flit: Flit) -> Self {
        Self { flit, valid: true }
    }

    pub fn as_option(&self) -> Option<&Flit> {
        if self.valid {
            Some(&self.flit)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let format = FlitFormat::new(16, 4).unwrap();
        let flit = Flit::header(&format, 0b1011, CircuitCommand::Allocate);
        assert_eq!(flit.width(), 16);
        assert!(flit.is_bop());
        assert!(!flit.is_eop());
        assert_eq!(flit.address(&format), 0b1011);
        assert_eq!(flit.circuit_command(&format), CircuitCommand::Allocate);
        // BOP at width - 2, command right above the address
        assert!(flit.data()[14]);
        assert!(flit.data()[4]);
        assert!(!flit.data()[5]);
    }

    #[test]
    fn reserved_command_decodes_as_none() {
        let format = FlitFormat::new(16, 4).unwrap();
        let mut flit = Flit::header(&format, 0, CircuitCommand::None);
        flit.data.set(4, true);
        flit.data.set(5, true);
        assert_eq!(flit.circuit_command(&format), CircuitCommand::None);
    }

    #[test]
    fn packet_framing() {
        let format = FlitFormat::default();
        let packet = Rc::new(Packet::new(3, 0x12, 2, 0));
        let flits = packet.to_flits(&format, CircuitCommand::None);
        assert_eq!(flits.len(), 3);
        assert_eq!(flits.iter().filter(|f| f.is_bop()).count(), 1);
        assert_eq!(flits.iter().filter(|f| f.is_eop()).count(), 1);
        assert!(flits[0].is_bop());
        assert!(flits[2].is_eop());
        assert!(!flits[1].is_bop() && !flits[1].is_eop());
        assert_eq!(flits[1].word(), (3 << 16) | 1);
        assert!(flits.iter().all(|f| f.packet().map(|p| p.id) == Some(3)));
    }

    #[test]
    fn single_flit_packet() {
        let format = FlitFormat::default();
        let packet = Rc::new(Packet::new(0, 1, 0, 0));
        let flits = packet.to_flits(&format, CircuitCommand::None);
        assert_eq!(flits.len(), 1);
        assert!(flits[0].is_bop() && flits[0].is_eop());
    }

    #[test]
    fn format_validation() {
        assert!(FlitFormat::new(8, 4).is_ok());
        assert_eq!(
            FlitFormat::new(7, 4),
            Err(Error::InvalidFlitFormat {
                width: 7,
                address_width: 4
            })
        );
        assert!(FlitFormat::new(40, 0).is_err());
        assert!(FlitFormat::new(64, 33).is_err());
    }
}

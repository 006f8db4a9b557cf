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

use std::fmt;

/// Reports a broken contract between pipeline components.
///
/// Fatal in debug builds. Release builds log the violation and the caller
/// falls through to a no-op that leaves its state untouched.
macro_rules! protocol_violation {
    ($($arg:tt)+) => {{
        log::error!($($arg)+);
        if cfg!(debug_assertions) {
            panic!($($arg)+);
        }
    }};
}

#[derive(Debug, Eq, PartialEq)]
pub enum Error {
    InvalidFlitFormat { width: usize, address_width: usize },
    InvalidPortCount(usize),
    InvalidBufferDepth { port: usize },
    InvalidCredits { port: usize },
    InvalidPriority { input: usize, inputs: usize },
    InvalidPort(usize),
    InvalidCoordinates { x: usize, y: usize },
    /// A node addressed a packet to itself.
    Loopback { x: usize, y: usize },
    InvalidConfiguration(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidFlitFormat {
                width,
                address_width,
            } => write!(
                f,
                "ERROR: {}-bit flits cannot hold framing, circuit command and a {}-bit address",
                width, address_width
            ),
            Self::InvalidPortCount(count) => {
                write!(f, "ERROR: a router needs at least 2 ports, got {}", count)
            }
            Self::InvalidBufferDepth { port } => {
                write!(f, "ERROR: input buffer of port {} must hold at least one flit", port)
            }
            Self::InvalidCredits { port } => {
                write!(
                    f,
                    "ERROR: output {} needs 1 to receiving-buffer-depth credits",
                    port
                )
            }
            Self::InvalidPriority { input, inputs } => write!(
                f,
                "ERROR: static priority input {} out of range for {} inputs",
                input, inputs
            ),
            Self::InvalidConfiguration(reason) => write!(f, "ERROR: {}", reason),
            _ => write!(f, "{:?}", self),
        }
    }
}

impl std::error::Error for Error {}

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

//! Arbitration priority policies.

use bitvec::prelude::*;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// A bit vector with exactly one bit set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OneHot {
    bits: BitVec<usize, Lsb0>,
}

impl OneHot {
    pub fn new(len: usize, index: usize) -> Self {
        assert!(index < len, "one-hot index {} out of {} bits", index, len);
        let mut bits = BitVec::repeat(false, len);
        bits.set(index, true);
        Self { bits }
    }

    pub fn index(&self) -> usize {
        // the constructor guarantees one set bit
        self.bits.first_one().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn as_bitslice(&self) -> &BitSlice<usize, Lsb0> {
        self.bits.as_bitslice()
    }

    /// Moves the hot bit one position towards the most significant end,
    /// wrapping around.
    pub fn rotate_left(&self) -> Self {
        Self::new(self.len(), (self.index() + 1) % self.len())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityPolicy {
    Static { input: usize },
    Random { seed: u64 },
    Rotating,
    RoundRobin,
}

impl Default for PriorityPolicy {
    fn default() -> Self {
        Self::Rotating
    }
}

impl FromStr for PriorityPolicy {
    type Err = Error;

    /// `static`, `static:<input>`, `random`, `random:<seed>`, `rotating`,
    /// `round-robin`.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let lower = name.to_ascii_lowercase();
        let (policy, arg) = match lower.split_once(':') {
            Some((policy, arg)) => (policy, Some(arg)),
            None => (lower.as_str(), None),
        };
        let parse_arg = |default: u64| -> Result<u64, Error> {
            arg.map_or(Ok(default), |a| {
                a.parse::<u64>().map_err(|_| {
                    Error::InvalidConfiguration(format!("bad priority argument in '{}'", name))
                })
            })
        };
        match policy {
            "static" => Ok(Self::Static {
                input: parse_arg(0)? as usize,
            }),
            "random" => Ok(Self::Random {
                seed: parse_arg(0)?,
            }),
            "rotating" | "rotative" => Ok(Self::Rotating),
            "round-robin" | "round_robin" | "rr" => Ok(Self::RoundRobin),
            _ => Err(Error::InvalidConfiguration(format!(
                "unknown priority policy '{}'",
                name
            ))),
        }
    }
}

impl fmt::Display for PriorityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Static { input } => write!(f, "static:{}", input),
            Self::Random { seed } => write!(f, "random:{}", seed),
            Self::Rotating => write!(f, "rotating"),
            Self::RoundRobin => write!(f, "round-robin"),
        }
    }
}

/// Produces the one-hot priority vector an arbiter scans from.
///
/// The variant is fixed at construction.
#[derive(Clone, Debug)]
pub enum PriorityGenerator {
    Static(OneHot),
    Random {
        priority: OneHot,
        rng: Xoshiro256StarStar,
    },
    /// Rotates by one whenever a new grant appears.
    Rotating {
        priority: OneHot,
        previous_grants: BitVec<usize, Lsb0>,
    },
    /// Points just past the newly granted input whenever a new grant appears.
    RoundRobin {
        priority: OneHot,
        previous_grants: BitVec<usize, Lsb0>,
    },
}

impl PriorityGenerator {
    pub fn new(policy: &PriorityPolicy, inputs: usize) -> Result<Self, Error> {
        if inputs == 0 {
            return Err(Error::InvalidPortCount(inputs));
        }
        let idle = || BitVec::repeat(false, inputs);
        Ok(match policy {
            PriorityPolicy::Static { input } => {
                if *input >= inputs {
                    return Err(Error::InvalidPriority {
                        input: *input,
                        inputs,
                    });
                }
                Self::Static(OneHot::new(inputs, *input))
            }
            PriorityPolicy::Random { seed } => {
                let mut rng = Xoshiro256StarStar::seed_from_u64(*seed);
                let priority = OneHot::new(inputs, rng.gen_range(0..inputs));
                Self::Random { priority, rng }
            }
            PriorityPolicy::Rotating => Self::Rotating {
                priority: OneHot::new(inputs, 0),
                previous_grants: idle(),
            },
            PriorityPolicy::RoundRobin => Self::RoundRobin {
                priority: OneHot::new(inputs, 0),
                previous_grants: idle(),
            },
        })
    }

    pub fn priority(&self) -> &OneHot {
        match self {
            Self::Static(priority)
            | Self::Random { priority, .. }
            | Self::Rotating { priority, .. }
            | Self::RoundRobin { priority, .. } => priority,
        }
    }

    /// Clock edge: derives next cycle's priority from this cycle's grants.
    pub fn commit(&mut self, grants: &BitSlice<usize, Lsb0>) {
        match self {
            Self::Static(_) => {}
            Self::Random { priority, rng } => {
                *priority = OneHot::new(priority.len(), rng.gen_range(0..priority.len()));
            }
            Self::Rotating {
                priority,
                previous_grants,
            } => {
                if rising_grant(grants, previous_grants).is_some() {
                    *priority = priority.rotate_left();
                }
                previous_grants.copy_from_bitslice(grants);
            }
            Self::RoundRobin {
                priority,
                previous_grants,
            } => {
                if let Some(granted) = rising_grant(grants, previous_grants) {
                    *priority = OneHot::new(priority.len(), (granted + 1) % priority.len());
                }
                previous_grants.copy_from_bitslice(grants);
            }
        }
    }
}

/// The first input whose grant went from 0 to 1.
fn rising_grant(grants: &BitSlice<usize, Lsb0>, previous: &BitSlice<usize, Lsb0>) -> Option<usize> {
    grants.iter_ones().find(|&i| !previous[i])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(len: usize, index: Option<usize>) -> BitVec<usize, Lsb0> {
        let mut bits = BitVec::repeat(false, len);
        if let Some(i) = index {
            bits.set(i, true);
        }
        bits
    }

    #[test]
    fn static_never_moves() {
        let mut pg = PriorityGenerator::new(&PriorityPolicy::Static { input: 2 }, 4).unwrap();
        for i in 0..8 {
            pg.commit(&grant(4, Some(i % 4)));
            assert_eq!(pg.priority().index(), 2);
        }
    }

    #[test]
    fn static_out_of_range() {
        assert_eq!(
            PriorityGenerator::new(&PriorityPolicy::Static { input: 4 }, 4).err(),
            Some(Error::InvalidPriority {
                input: 4,
                inputs: 4
            })
        );
    }

    #[test]
    fn random_is_one_hot() {
        let mut pg = PriorityGenerator::new(&PriorityPolicy::Random { seed: 42 }, 5).unwrap();
        let mut seen = vec![false; 5];
        for _ in 0..200 {
            assert_eq!(pg.priority().as_bitslice().count_ones(), 1);
            seen[pg.priority().index()] = true;
            pg.commit(&grant(5, None));
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn rotating_moves_on_edges_only() {
        let mut pg = PriorityGenerator::new(&PriorityPolicy::Rotating, 3).unwrap();
        assert_eq!(pg.priority().index(), 0);
        pg.commit(&grant(3, Some(0)));
        assert_eq!(pg.priority().index(), 1);
        // same grant held: no edge
        pg.commit(&grant(3, Some(0)));
        assert_eq!(pg.priority().index(), 1);
        pg.commit(&grant(3, None));
        assert_eq!(pg.priority().index(), 1);
        pg.commit(&grant(3, Some(2)));
        assert_eq!(pg.priority().index(), 2);
        // grant moving to another input is an edge too
        pg.commit(&grant(3, Some(1)));
        assert_eq!(pg.priority().index(), 0);
    }

    #[test]
    fn round_robin_follows_winner() {
        let mut pg = PriorityGenerator::new(&PriorityPolicy::RoundRobin, 4).unwrap();
        pg.commit(&grant(4, Some(2)));
        assert_eq!(pg.priority().index(), 3);
        pg.commit(&grant(4, Some(2)));
        assert_eq!(pg.priority().index(), 3);
        pg.commit(&grant(4, Some(3)));
        assert_eq!(pg.priority().index(), 0);
    }

    #[test]
    fn parse_policies() {
        assert_eq!(
            "static:3".parse::<PriorityPolicy>(),
            Ok(PriorityPolicy::Static { input: 3 })
        );
        assert_eq!(
            "random:9".parse::<PriorityPolicy>(),
            Ok(PriorityPolicy::Random { seed: 9 })
        );
        assert_eq!("Rotating".parse::<PriorityPolicy>(), Ok(PriorityPolicy::Rotating));
        assert_eq!(
            "round-robin".parse::<PriorityPolicy>(),
            Ok(PriorityPolicy::RoundRobin)
        );
        assert!("lottery".parse::<PriorityPolicy>().is_err());
        assert!("static:x".parse::<PriorityPolicy>().is_err());
    }
}

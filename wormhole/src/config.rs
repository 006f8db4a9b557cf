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

//! Router and network parameters, built programmatically or read from YAML.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::{Error, FlitFormat, FlowControlKind, PriorityPolicy, RoutingAlgorithm};

const DEFAULT_DEPTH: usize = 4;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct PortConfiguration {
    pub input_depth: usize,
    /// 0 turns the output stage into a pass-through.
    pub output_depth: usize,
    /// Credits of the output link; the input depth when left out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credits: Option<usize>,
}

impl PortConfiguration {
    pub fn new(input_depth: usize, output_depth: usize) -> Self {
        Self {
            input_depth,
            output_depth,
            credits: None,
        }
    }

    pub fn credits(&self) -> usize {
        self.credits.unwrap_or(self.input_depth)
    }
}

impl Default for PortConfiguration {
    fn default() -> Self {
        Self::new(DEFAULT_DEPTH, DEFAULT_DEPTH)
    }
}

/// Parameters of one router.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct RouterConfiguration {
    #[serde(default)]
    pub format: FlitFormat,
    /// One entry per port; port i has input i and output i.
    pub ports: Vec<PortConfiguration>,
    #[serde(default)]
    pub flow_control: FlowControlKind,
    #[serde(default)]
    pub priority: PriorityPolicy,
    #[serde(default)]
    pub routing: RoutingAlgorithm,
    #[serde(default)]
    pub circuit_switching: bool,
}

impl RouterConfiguration {
    pub fn with_ports(ports: usize) -> Self {
        Self {
            ports: vec![PortConfiguration::default(); ports],
            ..Default::default()
        }
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.format.validate()?;
        if self.ports.len() < 2 {
            return Err(Error::InvalidPortCount(self.ports.len()));
        }
        for (port, config) in self.ports.iter().enumerate() {
            if config.input_depth == 0 {
                return Err(Error::InvalidBufferDepth { port });
            }
            if self.flow_control == FlowControlKind::Credit && config.credits() == 0 {
                return Err(Error::InvalidCredits { port });
            }
        }
        if let PriorityPolicy::Static { input } = self.priority {
            if input >= self.ports.len() {
                return Err(Error::InvalidPriority {
                    input,
                    inputs: self.ports.len(),
                });
            }
        }
        Ok(())
    }

    pub fn from_file(file_name: &str) -> Result<Self, Error> {
        from_file(file_name)
    }

    pub fn from_str(config: &str) -> Result<Self, Error> {
        from_str(config)
    }

    pub fn to_string(&self) -> Result<String, Error> {
        serde_yaml::to_string(self).map_err(|e| Error::InvalidConfiguration(e.to_string()))
    }
}

impl Default for RouterConfiguration {
    fn default() -> Self {
        Self {
            format: FlitFormat::default(),
            ports: vec![PortConfiguration::default(); 5],
            flow_control: FlowControlKind::default(),
            priority: PriorityPolicy::default(),
            routing: RoutingAlgorithm::default(),
            circuit_switching: false,
        }
    }
}

/// A `columns` x `rows` mesh of identical five-port routers.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct NetworkConfiguration {
    pub columns: usize,
    pub rows: usize,
    #[serde(default)]
    pub router: RouterConfiguration,
}

impl NetworkConfiguration {
    pub fn new(columns: usize, rows: usize) -> Self {
        Self {
            columns,
            rows,
            router: RouterConfiguration::default(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.columns * self.rows
    }

    pub fn from_file(file_name: &str) -> Result<Self, Error> {
        from_file(file_name)
    }

    pub fn from_str(config: &str) -> Result<Self, Error> {
        from_str(config)
    }

    pub fn to_string(&self) -> Result<String, Error> {
        serde_yaml::to_string(self).map_err(|e| Error::InvalidConfiguration(e.to_string()))
    }
}

fn from_file<T: for<'de> Deserialize<'de>>(file_name: &str) -> Result<T, Error> {
    let file = File::open(Path::new(file_name))
        .map_err(|e| Error::InvalidConfiguration(format!("{}: {}", file_name, e)))?;
    let reader = BufReader::new(file);
    serde_yaml::from_reader(reader)
        .map_err(|e| Error::InvalidConfiguration(format!("{}: {}", file_name, e)))
}

fn from_str<T: for<'de> Deserialize<'de>>(config: &str) -> Result<T, Error> {
    serde_yaml::from_str(config).map_err(|e| Error::InvalidConfiguration(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_yaml_config() {
        let conf_str = "---
columns: 3
rows: 2
router:
  format:
    width: 40
    address_width: 8
  ports:
    - input_depth: 2
      output_depth: 0
    - input_depth: 4
      output_depth: 4
      credits: 3
    - input_depth: 4
      output_depth: 4
  flow_control: handshake
  priority:
    random:
      seed: 7
  routing: west_first
  circuit_switching: true
";
        let config = NetworkConfiguration::from_str(conf_str).unwrap();
        assert_eq!(config.columns, 3);
        assert_eq!(config.rows, 2);
        assert_eq!(config.node_count(), 6);
        let router = &config.router;
        assert_eq!(router.format.width, 40);
        assert_eq!(router.port_count(), 3);
        assert_eq!(router.ports[0].output_depth, 0);
        assert_eq!(router.ports[0].credits(), 2);
        assert_eq!(router.ports[1].credits(), 3);
        assert_eq!(router.flow_control, FlowControlKind::Handshake);
        assert_eq!(router.priority, PriorityPolicy::Random { seed: 7 });
        assert_eq!(router.routing, RoutingAlgorithm::WestFirst);
        assert!(router.circuit_switching);
        assert_eq!(router.validate(), Ok(()));
    }

    #[test]
    fn defaults_fill_in() {
        let config = RouterConfiguration::from_str(
            "ports:
  - input_depth: 1
    output_depth: 1
  - input_depth: 1
    output_depth: 1
",
        )
        .unwrap();
        assert_eq!(config.format, FlitFormat::default());
        assert_eq!(config.flow_control, FlowControlKind::Credit);
        assert_eq!(config.priority, PriorityPolicy::Rotating);
        assert_eq!(config.routing, RoutingAlgorithm::Xy);
        assert!(!config.circuit_switching);
    }

    #[test]
    fn write_yaml_config() {
        let mut config = NetworkConfiguration::new(2, 2);
        config.router.ports[0].credits = Some(2);
        config.router.priority = PriorityPolicy::Static { input: 3 };
        let yaml = config.to_string().unwrap();
        println!("{}", yaml);
        assert_eq!(NetworkConfiguration::from_str(&yaml).unwrap(), config);
    }

    #[test]
    fn validation() {
        let mut config = RouterConfiguration::with_ports(1);
        assert_eq!(config.validate(), Err(Error::InvalidPortCount(1)));

        config = RouterConfiguration::with_ports(3);
        config.ports[1].input_depth = 0;
        assert_eq!(config.validate(), Err(Error::InvalidBufferDepth { port: 1 }));

        config = RouterConfiguration::with_ports(3);
        config.ports[2].credits = Some(0);
        assert_eq!(config.validate(), Err(Error::InvalidCredits { port: 2 }));
        config.flow_control = FlowControlKind::Handshake;
        assert_eq!(config.validate(), Ok(()));

        config = RouterConfiguration::with_ports(3);
        config.priority = PriorityPolicy::Static { input: 3 };
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidPriority { input: 3, inputs: 3 })
        ));

        config = RouterConfiguration::with_ports(3);
        config.format.address_width = 40;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            RouterConfiguration::from_file("/nonexistent/router.yaml"),
            Err(Error::InvalidConfiguration(_))
        ));
    }
}

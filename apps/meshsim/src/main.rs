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

use anyhow::{bail, Context, Result};
use env_logger::Target;
use log::info;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use std::collections::HashSet;
use structopt::StructOpt;

use wormhole::{
    Coordinates, FlowControlKind, Mesh, NetworkConfiguration, PriorityPolicy, RoutingAlgorithm,
};

#[derive(StructOpt)]
#[structopt(name = "meshsim", about = "Uniform random traffic on a wormhole mesh")]
struct Arguments {
    /// YAML network configuration; a default router otherwise
    #[structopt(long)]
    config: Option<String>,
    #[structopt(long, default_value = "4")]
    columns: usize,
    #[structopt(long, default_value = "4")]
    rows: usize,
    /// upper bound on simulated cycles
    #[structopt(short, long, default_value = "10000")]
    cycles: usize,
    /// total packets to inject
    #[structopt(short, long, default_value = "500")]
    packets: usize,
    /// payload flits per packet
    #[structopt(short, long, default_value = "4")]
    length: usize,
    /// injection probability per node and cycle
    #[structopt(short, long, default_value = "0.05")]
    rate: f64,
    #[structopt(short, long, default_value = "1")]
    seed: u64,
    /// credit, handshake
    #[structopt(long)]
    flow_control: Option<FlowControlKind>,
    /// static[:n], random[:seed], rotating, round-robin
    #[structopt(long)]
    priority: Option<PriorityPolicy>,
    /// xy, west-first
    #[structopt(long)]
    routing: Option<RoutingAlgorithm>,
}

fn configuration(args: &Arguments) -> Result<NetworkConfiguration> {
    let mut config = match &args.config {
        Some(file) => NetworkConfiguration::from_file(file)
            .with_context(|| format!("loading {}", file))?,
        None => NetworkConfiguration::new(args.columns, args.rows),
    };
    if let Some(flow_control) = args.flow_control {
        config.router.flow_control = flow_control;
    }
    if let Some(priority) = &args.priority {
        config.router.priority = priority.clone();
    }
    if let Some(routing) = args.routing {
        config.router.routing = routing;
    }
    Ok(config)
}

fn main() -> Result<()> {
    let args = Arguments::from_args();

    let _logger = env_logger::builder()
        .filter(Some("meshsim"), log::LevelFilter::Info)
        .target(Target::Stderr)
        .init();

    if !(0.0..=1.0).contains(&args.rate) {
        bail!("injection rate {} is not a probability", args.rate);
    }
    let config = configuration(&args)?;
    let mut mesh = Mesh::new(&config)?;
    let nodes: Vec<Coordinates> = mesh.nodes().collect();
    if nodes.len() < 2 {
        bail!("a single node has nobody to talk to");
    }
    let mut rng = Xoshiro256StarStar::seed_from_u64(args.seed);

    while mesh.cycle() < args.cycles && mesh.sent_count() < args.packets {
        for &source in &nodes {
            if mesh.sent_count() < args.packets && rng.gen_bool(args.rate) {
                let mut destination = source;
                while destination == source {
                    destination = nodes[rng.gen_range(0..nodes.len())];
                }
                mesh.send(source, destination, args.length)?;
            }
        }
        mesh.tick();
    }
    let injected_until = mesh.cycle();
    let drained = mesh.drain(args.cycles.saturating_sub(injected_until));
    info!(
        "injected {} packets in {} cycles, stopped at cycle {}",
        mesh.sent_count(),
        injected_until,
        mesh.cycle()
    );

    let mut seen = HashSet::new();
    let mut latencies = Vec::new();
    for &node in &nodes {
        for delivery in mesh.delivered(node)? {
            if !seen.insert(delivery.packet.id) {
                bail!("packet {} delivered twice", delivery.packet.id);
            }
            latencies.push(delivery.latency());
        }
    }
    if !drained {
        bail!(
            "{} of {} packets still in flight after {} cycles",
            mesh.sent_count() - mesh.delivered_count(),
            mesh.sent_count(),
            mesh.cycle()
        );
    }

    let average = latencies.iter().sum::<usize>() as f64 / latencies.len().max(1) as f64;
    println!("delivered packets: {}", latencies.len());
    println!("average latency:   {:.2} cycles", average);
    println!(
        "maximum latency:   {} cycles",
        latencies.iter().max().copied().unwrap_or(0)
    );
    println!(
        "throughput:        {:.4} flits/node/cycle",
        (latencies.len() * (args.length + 1)) as f64 / (nodes.len() * mesh.cycle().max(1)) as f64
    );
    Ok(())
}

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

use bencher::Bencher;
use bencher::{benchmark_group, benchmark_main};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

use wormhole::{Coordinates, FlowControlKind, Mesh, NetworkConfiguration, PriorityPolicy};

const SIDE: usize = 4;
const CYCLES: usize = 1000;
const PACKETS_PER_NODE: usize = 20;
const PAYLOAD: usize = 4;

/// A mesh with every node sending to uniformly random destinations.
fn loaded_mesh(config: &NetworkConfiguration) -> Mesh {
    let mut mesh = Mesh::new(config).unwrap();
    let mut rng = Xoshiro256StarStar::seed_from_u64(0xcafe);
    let nodes: Vec<Coordinates> = mesh.nodes().collect();
    for &source in &nodes {
        for _ in 0..PACKETS_PER_NODE {
            let mut destination = source;
            while destination == source {
                destination = nodes[rng.gen_range(0..nodes.len())];
            }
            mesh.send(source, destination, PAYLOAD).unwrap();
        }
    }
    mesh
}

fn step(bench: &mut Bencher, config: NetworkConfiguration) {
    bench.iter(|| {
        let mut mesh = loaded_mesh(&config);
        mesh.run(CYCLES);
        mesh.delivered_count()
    });
}

fn credit_rotating(bench: &mut Bencher) {
    step(bench, NetworkConfiguration::new(SIDE, SIDE));
}

fn credit_random(bench: &mut Bencher) {
    let mut config = NetworkConfiguration::new(SIDE, SIDE);
    config.router.priority = PriorityPolicy::Random { seed: 1 };
    step(bench, config);
}

fn handshake(bench: &mut Bencher) {
    let mut config = NetworkConfiguration::new(SIDE, SIDE);
    config.router.flow_control = FlowControlKind::Handshake;
    step(bench, config);
}

fn pass_through(bench: &mut Bencher) {
    let mut config = NetworkConfiguration::new(SIDE, SIDE);
    for port in config.router.ports.iter_mut() {
        port.output_depth = 0;
    }
    step(bench, config);
}

benchmark_group!(credit, credit_rotating, credit_random, pass_through);
benchmark_group!(benches_handshake, handshake);
benchmark_main!(credit, benches_handshake);

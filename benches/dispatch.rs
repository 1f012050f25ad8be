use std::time::Instant;

use criterion::{BenchmarkId, Criterion};
use mupol::{
    config::DispatchConfig,
    dispatch::simulate_dispatch,
    problem::{Freighter, Order, Problem, RouteMatrix, Truck},
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tokio::runtime::Runtime;

pub fn dispatch_benchmark(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut g = c.benchmark_group("dispatch");
    for num_orders in [2, 4, 8] {
        let problem = grid_problem(num_orders, 42);
        let bench_id = BenchmarkId::new("3 parties, 3 trucks", num_orders);
        g.bench_function(bench_id, |b| {
            b.to_async(&rt).iter_custom(|iters| {
                let problem = problem.clone();
                async move {
                    let now = Instant::now();
                    for _ in 0..iters {
                        simulate_dispatch(&problem, &DispatchConfig::default(), 3)
                            .await
                            .expect("dispatch failed");
                    }
                    now.elapsed()
                }
            })
        });
    }
}

/// Three freighters with one truck each on a 3x3 grid.
fn grid_problem(num_orders: usize, seed: u64) -> Problem {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let costs = (0..9u32)
        .map(|a| {
            (0..9u32)
                .map(|b| (a % 3).abs_diff(b % 3) + (a / 3).abs_diff(b / 3))
                .collect()
        })
        .collect();
    let freighters: Vec<_> = (0..3).map(|id| Freighter { id, party: id as usize }).collect();
    let trucks = freighters
        .iter()
        .map(|f| Truck {
            owner: f.party,
            freighter: f.id,
            position: rng.random_range(0..9),
            capacity: 10,
        })
        .collect();
    let orders = (0..num_orders)
        .map(|_| {
            let origin = rng.random_range(0..9);
            Order {
                owner: rng.random_range(0..3),
                origin,
                destination: (origin + rng.random_range(1..9)) % 9,
                volume: rng.random_range(1..=10),
            }
        })
        .collect();
    Problem {
        freighters,
        trucks,
        orders,
        route_matrix: RouteMatrix::new(costs),
    }
}

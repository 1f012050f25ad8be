//! Random problem instances on a grid map.

use anyhow::{Error, ensure};
use mupol::problem::{Freighter, Order, Problem, RouteMatrix, Truck};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::Deserialize;

/// The shape of a generated problem.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    pub parties: usize,
    pub num_freighters: u32,
    pub min_num_trucks: u32,
    pub max_num_trucks: u32,
    pub truck_capacity: u32,
    pub num_orders: usize,
    pub min_order_volume: u32,
    pub max_order_volume: u32,
    pub num_nodes: u32,
    #[serde(rename = "random_seed")]
    pub seed: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            parties: 3,
            num_freighters: 3,
            min_num_trucks: 1,
            max_num_trucks: 2,
            truck_capacity: 10,
            num_orders: 5,
            min_order_volume: 1,
            max_order_volume: 5,
            num_nodes: 9,
            seed: 0,
        }
    }
}

/// Generates a problem with nodes on a square grid and Manhattan driving costs.
///
/// Freighters are assigned to parties round robin, orders are owned by random parties. Volumes
/// never exceed the truck capacity, so every generated problem can be dispatched.
pub fn generate(opts: &Options) -> Result<Problem, Error> {
    ensure!(opts.parties > 0, "at least one party is required");
    ensure!(opts.num_nodes >= 2, "the map needs at least 2 nodes");
    ensure!(
        opts.min_num_trucks <= opts.max_num_trucks,
        "the minimum number of trucks exceeds the maximum"
    );
    ensure!(
        0 < opts.min_order_volume && opts.min_order_volume <= opts.max_order_volume,
        "order volumes must be a non-empty range of positive values"
    );
    ensure!(
        opts.max_order_volume <= opts.truck_capacity,
        "orders of volume {} do not fit into trucks of capacity {}",
        opts.max_order_volume,
        opts.truck_capacity
    );
    let mut rng = ChaCha20Rng::seed_from_u64(opts.seed);

    let side = (opts.num_nodes as f64).sqrt().ceil() as u32;
    let coordinates = |node: u32| (node % side, node / side);
    let costs = (0..opts.num_nodes)
        .map(|a| {
            let (ax, ay) = coordinates(a);
            (0..opts.num_nodes)
                .map(|b| {
                    let (bx, by) = coordinates(b);
                    ax.abs_diff(bx) + ay.abs_diff(by)
                })
                .collect()
        })
        .collect();

    let freighters: Vec<Freighter> = (0..opts.num_freighters)
        .map(|id| Freighter {
            id,
            party: id as usize % opts.parties,
        })
        .collect();

    let mut trucks = vec![];
    for freighter in &freighters {
        let count = rng.random_range(opts.min_num_trucks..=opts.max_num_trucks);
        for _ in 0..count {
            trucks.push(Truck {
                owner: freighter.party,
                freighter: freighter.id,
                position: rng.random_range(0..opts.num_nodes),
                capacity: opts.truck_capacity,
            });
        }
    }

    let orders = (0..opts.num_orders)
        .map(|_| {
            let origin = rng.random_range(0..opts.num_nodes);
            let destination = (origin + rng.random_range(1..opts.num_nodes)) % opts.num_nodes;
            Order {
                owner: rng.random_range(0..opts.parties),
                origin,
                destination,
                volume: rng.random_range(opts.min_order_volume..=opts.max_order_volume),
            }
        })
        .collect();

    Ok(Problem {
        freighters,
        trucks,
        orders,
        route_matrix: RouteMatrix::new(costs),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> Options {
        Options {
            parties: 3,
            num_freighters: 4,
            min_num_trucks: 1,
            max_num_trucks: 3,
            truck_capacity: 10,
            num_orders: 20,
            min_order_volume: 1,
            max_order_volume: 10,
            num_nodes: 9,
            seed: 42,
        }
    }

    #[test]
    fn same_seed_same_problem() {
        assert_eq!(generate(&options()).unwrap(), generate(&options()).unwrap());
    }

    #[test]
    fn generated_problem_is_consistent() {
        let problem = generate(&options()).unwrap();
        assert_eq!(problem.route_matrix.cost(0, 8), Some(4));
        assert_eq!(problem.route_matrix.cost(4, 4), Some(0));
        assert_eq!(problem.route_matrix.cost(2, 3), Some(3));
        let parties: Vec<_> = problem.freighters.iter().map(|f| f.party).collect();
        assert_eq!(parties, vec![0, 1, 2, 0]);
        assert!((4..=12).contains(&problem.trucks.len()));
        for truck in &problem.trucks {
            assert_eq!(truck.owner, truck.freighter as usize % 3);
        }
        for order in &problem.orders {
            assert_ne!(order.origin, order.destination);
            assert!((1..=10).contains(&order.volume));
        }
    }

    #[test]
    fn rejects_orders_larger_than_trucks() {
        let opts = Options {
            max_order_volume: 11,
            ..options()
        };
        assert!(generate(&opts).is_err());
    }
}

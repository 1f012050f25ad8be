//! The plaintext problem instance.
//!
//! Party indices, the freighter to party mapping and the route matrix are public and must be the
//! same for every computing party. All other fields are private to the party that owns the truck
//! or order; the other parties may fill them with arbitrary placeholders, they are never read.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, DispatchConfig};

/// A company owning trucks, represented by one of the computing parties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Freighter {
    /// The id revealed for the orders the freighter is assigned to.
    pub id: u32,
    /// The computing party acting on behalf of the freighter.
    pub party: usize,
}

/// A truck, uploaded by its `owner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Truck {
    /// The party uploading the truck.
    pub owner: usize,
    /// The id of the freighter owning the truck (private).
    pub freighter: u32,
    /// The node where the truck starts (private).
    pub position: u32,
    /// The full loading capacity (private).
    pub capacity: u32,
}

/// A delivery order, uploaded by its `owner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// The party uploading the order.
    pub owner: usize,
    /// The pickup node (private).
    pub origin: u32,
    /// The delivery node (private).
    pub destination: u32,
    /// The volume to transport (private).
    pub volume: u32,
}

/// The square matrix of driving costs between every pair of nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteMatrix {
    costs: Vec<Vec<u32>>,
}

impl RouteMatrix {
    /// Wraps the costs, `costs[from][to]` is the cost of driving from `from` to `to`.
    pub fn new(costs: Vec<Vec<u32>>) -> Self {
        Self { costs }
    }

    /// The number of nodes of the map.
    pub fn num_nodes(&self) -> usize {
        self.costs.len()
    }

    /// The cost of driving from `from` to `to`.
    pub fn cost(&self, from: usize, to: usize) -> Option<u32> {
        self.costs.get(from)?.get(to).copied()
    }

    /// The rows of the matrix.
    pub fn rows(&self) -> &[Vec<u32>] {
        &self.costs
    }
}

/// A complete dispatch problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    /// The freighters taking part.
    pub freighters: Vec<Freighter>,
    /// The trucks of all freighters.
    pub trucks: Vec<Truck>,
    /// The orders to dispatch.
    pub orders: Vec<Order>,
    /// The costs between the nodes of the map.
    pub route_matrix: RouteMatrix,
}

impl Problem {
    /// Maps freighter ids to the parties acting for them.
    pub fn freighter_parties(&self) -> HashMap<u32, usize> {
        self.freighters.iter().map(|f| (f.id, f.party)).collect()
    }

    /// Checks the public part of the problem: the map, the sentinels, the freighters, the owners
    /// and the number of trucks and orders.
    ///
    /// Every party runs this check on the same public values, so either all of them accept the
    /// problem or none does. The private fields are checked by [`Problem::validate_owned`].
    pub fn validate(&self, config: &DispatchConfig, parties: usize) -> Result<(), ConfigError> {
        config.validate()?;
        if parties == 0 {
            return Err(ConfigError::NoParties);
        }
        let num_nodes = self.route_matrix.num_nodes();
        if num_nodes == 0 {
            return Err(ConfigError::EmptyRouteMatrix);
        }
        for (row, costs) in self.route_matrix.rows().iter().enumerate() {
            if costs.len() != num_nodes {
                return Err(ConfigError::RouteMatrixNotSquare {
                    row,
                    len: costs.len(),
                    expected: num_nodes,
                });
            }
            for &cost in costs {
                config.check_fits("route cost", cost as u64)?;
            }
        }
        if (config.dummy_node as usize) < num_nodes {
            return Err(ConfigError::DummyNodeInRange {
                dummy_node: config.dummy_node,
                num_nodes,
            });
        }
        let check_party = |party: usize| {
            if party < parties {
                Ok(())
            } else {
                Err(ConfigError::UnknownParty { party, parties })
            }
        };

        let mut freighter_parties = HashMap::new();
        for freighter in &self.freighters {
            config.check_fits("freighter id", freighter.id as u64)?;
            check_party(freighter.party)?;
            if freighter.id == config.dummy_freighter_id {
                return Err(ConfigError::DummyFreighterCollision(freighter.id));
            }
            if freighter_parties.insert(freighter.id, freighter.party).is_some() {
                return Err(ConfigError::DuplicateFreighter(freighter.id));
            }
        }

        if !self.trucks.is_empty() {
            config.check_fits("truck index", self.trucks.len() as u64 - 1)?;
        }
        for truck in &self.trucks {
            check_party(truck.owner)?;
        }
        for order in &self.orders {
            check_party(order.owner)?;
        }
        if !self.orders.is_empty() && self.trucks.is_empty() {
            return Err(ConfigError::NoTrucks);
        }
        Ok(())
    }

    /// Checks the private fields of the trucks and orders owned by `party`.
    ///
    /// Every value that will be secret-shared must fit into the configured bit length, since an
    /// overflow cannot be detected once the values are shared. Trucks and orders of other parties
    /// are skipped.
    pub fn validate_owned(&self, config: &DispatchConfig, party: usize) -> Result<(), ConfigError> {
        let num_nodes = self.route_matrix.num_nodes();
        let check_node = |node: u32| {
            if (node as usize) < num_nodes {
                Ok(())
            } else {
                Err(ConfigError::UnknownNode { node, num_nodes })
            }
        };
        let freighter_parties = self.freighter_parties();
        for (i, truck) in self.trucks.iter().enumerate() {
            if truck.owner != party {
                continue;
            }
            let Some(&expected) = freighter_parties.get(&truck.freighter) else {
                return Err(ConfigError::UnknownFreighter {
                    truck: i,
                    freighter: truck.freighter,
                });
            };
            if truck.owner != expected {
                return Err(ConfigError::TruckOwnerMismatch {
                    truck: i,
                    owner: truck.owner,
                    expected,
                });
            }
            check_node(truck.position)?;
            config.check_fits("truck capacity", truck.capacity as u64)?;
        }
        for order in self.orders.iter().filter(|o| o.owner == party) {
            check_node(order.origin)?;
            check_node(order.destination)?;
            config.check_fits("order volume", order.volume as u64)?;
        }
        Ok(())
    }

    /// Runs the public check and the private check of every party.
    ///
    /// Only meaningful where the complete problem is known, as in a local simulation.
    pub fn validate_all(&self, config: &DispatchConfig, parties: usize) -> Result<(), ConfigError> {
        self.validate(config, parties)?;
        (0..parties).try_for_each(|party| self.validate_owned(config, party))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(num_nodes: u32) -> RouteMatrix {
        RouteMatrix::new(
            (0..num_nodes)
                .map(|a| (0..num_nodes).map(|b| a.abs_diff(b)).collect())
                .collect(),
        )
    }

    fn problem() -> Problem {
        Problem {
            freighters: vec![Freighter { id: 1, party: 0 }, Freighter { id: 2, party: 1 }],
            trucks: vec![
                Truck {
                    owner: 0,
                    freighter: 1,
                    position: 0,
                    capacity: 10,
                },
                Truck {
                    owner: 1,
                    freighter: 2,
                    position: 3,
                    capacity: 10,
                },
            ],
            orders: vec![Order {
                owner: 1,
                origin: 0,
                destination: 2,
                volume: 4,
            }],
            route_matrix: line(4),
        }
    }

    fn config() -> DispatchConfig {
        DispatchConfig {
            dummy_node: 15,
            dummy_freighter_id: 0,
            bit_length: 4,
            max_rounds: 10,
        }
    }

    #[test]
    fn accepts_valid_problem() {
        assert_eq!(problem().validate_all(&config(), 2), Ok(()));
        assert_eq!(problem().route_matrix.cost(0, 3), Some(3));
        assert_eq!(problem().route_matrix.cost(4, 0), None);
    }

    #[test]
    fn rejects_sentinel_collisions() {
        let mut config = config();
        config.dummy_node = 3;
        assert_eq!(
            problem().validate(&config, 2),
            Err(ConfigError::DummyNodeInRange {
                dummy_node: 3,
                num_nodes: 4
            })
        );
        let mut config = self::config();
        config.dummy_freighter_id = 2;
        assert_eq!(
            problem().validate(&config, 2),
            Err(ConfigError::DummyFreighterCollision(2))
        );
    }

    #[test]
    fn rejects_values_that_do_not_fit() {
        let mut problem = problem();
        problem.orders[0].volume = 16;
        assert_eq!(problem.validate(&config(), 2), Ok(()));
        assert_eq!(problem.validate_owned(&config(), 0), Ok(()));
        assert!(matches!(
            problem.validate_owned(&config(), 1),
            Err(ConfigError::ValueTooLarge {
                what: "order volume",
                ..
            })
        ));
    }

    #[test]
    fn rejects_inconsistent_ownership() {
        let mut p = problem();
        p.trucks[1].owner = 0;
        assert_eq!(
            p.validate_owned(&config(), 0),
            Err(ConfigError::TruckOwnerMismatch {
                truck: 1,
                owner: 0,
                expected: 1
            })
        );
        assert_eq!(
            problem().validate(&config(), 1),
            Err(ConfigError::UnknownParty {
                party: 1,
                parties: 1
            })
        );
        let mut p = problem();
        p.trucks[0].freighter = 7;
        assert_eq!(
            p.validate_owned(&config(), 0),
            Err(ConfigError::UnknownFreighter {
                truck: 0,
                freighter: 7
            })
        );
    }

    #[test]
    fn rejects_malformed_maps() {
        let mut p = problem();
        p.route_matrix = RouteMatrix::new(vec![vec![0, 1], vec![1]]);
        assert_eq!(
            p.validate(&config(), 2),
            Err(ConfigError::RouteMatrixNotSquare {
                row: 1,
                len: 1,
                expected: 2
            })
        );
        let mut p = problem();
        p.orders[0].destination = 4;
        assert_eq!(
            p.validate_all(&config(), 2),
            Err(ConfigError::UnknownNode {
                node: 4,
                num_nodes: 4
            })
        );
        let mut p = problem();
        p.trucks.clear();
        assert_eq!(p.validate(&config(), 2), Err(ConfigError::NoTrucks));
    }

    #[test]
    fn ignores_private_fields_of_other_parties() {
        let mut p = problem();
        p.trucks[1] = Truck {
            owner: 1,
            freighter: u32::MAX,
            position: u32::MAX,
            capacity: u32::MAX,
        };
        p.orders[0] = Order {
            owner: 1,
            origin: u32::MAX,
            destination: u32::MAX,
            volume: u32::MAX,
        };
        assert_eq!(p.validate(&config(), 2), Ok(()));
        assert_eq!(p.validate_owned(&config(), 0), Ok(()));
        assert!(p.validate_owned(&config(), 1).is_err());
    }
}

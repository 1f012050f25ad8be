//! Parameters of a dispatch run and the checks performed before anything is secret-shared.

use serde::{Deserialize, Serialize};

use crate::mpc::MAX_BIT_LENGTH;

/// The parameters every computing party must agree on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    /// The node id marking a truck without a destination, must not be a real node.
    pub dummy_node: u32,
    /// The freighter id marking an unassigned order, must not be a real freighter.
    pub dummy_freighter_id: u32,
    /// The number of bits of every secret value (node ids, costs, capacities, volumes, ids).
    pub bit_length: u32,
    /// The number of rounds after which a run is aborted as infeasible.
    pub max_rounds: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            dummy_node: 4095,
            dummy_freighter_id: 4095,
            bit_length: 12,
            max_rounds: 1000,
        }
    }
}

/// A configuration or problem instance that cannot be dispatched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The bit length is zero or too large for comparisons.
    #[error("bit length {0} is not in 1..={max}", max = MAX_BIT_LENGTH)]
    InvalidBitLength(u32),
    /// A value does not fit into the configured bit length.
    #[error("the {what} {value} does not fit into {bits} bits")]
    ValueTooLarge {
        /// What kind of value is too large.
        what: &'static str,
        /// The offending value.
        value: u64,
        /// The configured bit length.
        bits: u32,
    },
    /// The round limit is zero.
    #[error("the round limit must be at least 1")]
    NoRounds,
    /// There are no computing parties.
    #[error("at least one computing party is required")]
    NoParties,
    /// The route matrix has no nodes.
    #[error("the route matrix is empty")]
    EmptyRouteMatrix,
    /// A row of the route matrix does not have one entry per node.
    #[error("row {row} of the route matrix has {len} entries, expected {expected}")]
    RouteMatrixNotSquare {
        /// The index of the row.
        row: usize,
        /// The number of entries of the row.
        len: usize,
        /// The number of nodes.
        expected: usize,
    },
    /// The dummy node is a real node of the map.
    #[error("the dummy node {dummy_node} is a valid node of a map with {num_nodes} nodes")]
    DummyNodeInRange {
        /// The configured dummy node.
        dummy_node: u32,
        /// The number of nodes of the map.
        num_nodes: usize,
    },
    /// The dummy freighter id is the id of a real freighter.
    #[error("the dummy freighter id {0} is used by a freighter")]
    DummyFreighterCollision(u32),
    /// Two freighters share the same id.
    #[error("freighter id {0} is used more than once")]
    DuplicateFreighter(u32),
    /// A party index is out of range.
    #[error("party {party} does not exist, there are only {parties} parties")]
    UnknownParty {
        /// The offending party index.
        party: usize,
        /// The number of computing parties.
        parties: usize,
    },
    /// A truck belongs to a freighter that is not part of the problem.
    #[error("truck {truck} belongs to the unknown freighter {freighter}")]
    UnknownFreighter {
        /// The index of the truck.
        truck: usize,
        /// The id of the missing freighter.
        freighter: u32,
    },
    /// A truck is uploaded by a party that does not act for its freighter.
    #[error("truck {truck} is owned by party {owner}, but its freighter by party {expected}")]
    TruckOwnerMismatch {
        /// The index of the truck.
        truck: usize,
        /// The party owning the truck.
        owner: usize,
        /// The party of the truck's freighter.
        expected: usize,
    },
    /// A truck position or order endpoint is not a node of the map.
    #[error("node {node} is not on the map with {num_nodes} nodes")]
    UnknownNode {
        /// The offending node id.
        node: u32,
        /// The number of nodes of the map.
        num_nodes: usize,
    },
    /// Orders cannot be dispatched without any truck.
    #[error("there are orders to dispatch but no trucks")]
    NoTrucks,
}

impl DispatchConfig {
    /// Checks the bit length and that both sentinels fit into it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bit_length == 0 || self.bit_length > MAX_BIT_LENGTH {
            return Err(ConfigError::InvalidBitLength(self.bit_length));
        }
        self.check_fits("dummy node", self.dummy_node as u64)?;
        self.check_fits("dummy freighter id", self.dummy_freighter_id as u64)?;
        if self.max_rounds == 0 {
            return Err(ConfigError::NoRounds);
        }
        Ok(())
    }

    /// Fails if `value` needs more than [`DispatchConfig::bit_length`] bits.
    pub(crate) fn check_fits(&self, what: &'static str, value: u64) -> Result<(), ConfigError> {
        if value >> self.bit_length == 0 {
            Ok(())
        } else {
            Err(ConfigError::ValueTooLarge {
                what,
                value,
                bits: self.bit_length,
            })
        }
    }
}

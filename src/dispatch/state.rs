//! The secret-shared state of a dispatch run and its upload.

use tracing::debug;

use crate::{
    channel::Channel,
    config::DispatchConfig,
    mpc::{Error, SecretInt, Session},
    problem::Problem,
};

/// An order as seen by the computation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SecretOrder {
    pub(crate) origin: SecretInt,
    pub(crate) destination: SecretInt,
    pub(crate) volume: SecretInt,
    /// 1 once the order is assigned to a freighter.
    pub(crate) processed: SecretInt,
    /// 1 if the order was assigned during the current round.
    pub(crate) process_this_round: SecretInt,
    /// The dummy freighter id until the order is processed.
    pub(crate) freighter_id: SecretInt,
}

/// A truck as seen by the computation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SecretTruck {
    pub(crate) capacity: SecretInt,
    pub(crate) full_capacity: SecretInt,
    pub(crate) position: SecretInt,
    /// The dummy node unless the truck committed to a destination in the current round.
    pub(crate) destination: SecretInt,
    pub(crate) freighter_id: SecretInt,
    /// Scratch space of a single repositioning.
    pub(crate) dist_to_order: Option<SecretInt>,
}

/// A truck relocation without any order on board.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EmptyDrive {
    pub(crate) freighter_id: SecretInt,
    pub(crate) closest_position: SecretInt,
    pub(crate) destination: SecretInt,
}

/// All secret state of a run, owned by the round controller.
pub(crate) struct Fleet {
    pub(crate) trucks: Vec<SecretTruck>,
    pub(crate) orders: Vec<SecretOrder>,
    pub(crate) empty_drives: Vec<EmptyDrive>,
    pub(crate) route_matrix: Vec<Vec<SecretInt>>,
    pub(crate) dummy_node: i64,
    pub(crate) dummy_freighter_id: i64,
}

impl Fleet {
    pub(crate) fn num_nodes(&self) -> usize {
        self.route_matrix.len()
    }
}

/// Secret-shares the problem: every truck and order is input by its owner, the public route
/// matrix becomes a matrix of shared constants.
pub(crate) async fn upload(
    session: &Session<impl Channel>,
    config: &DispatchConfig,
    problem: &Problem,
) -> Result<Fleet, Error> {
    let me = session.party();
    let dummy_node = config.dummy_node as i64;
    let dummy_freighter_id = config.dummy_freighter_id as i64;

    if let Some(owner) = problem
        .orders
        .iter()
        .map(|o| o.owner)
        .chain(problem.trucks.iter().map(|t| t.owner))
        .find(|owner| *owner >= session.parties())
    {
        return Err(Error::PartyDoesNotExist(owner));
    }

    let mut orders: Vec<Option<SecretOrder>> = vec![None; problem.orders.len()];
    let mut trucks: Vec<Option<SecretTruck>> = vec![None; problem.trucks.len()];
    for owner in 0..session.parties() {
        let owned: Vec<usize> = (0..problem.orders.len())
            .filter(|&i| problem.orders[i].owner == owner)
            .collect();
        if !owned.is_empty() {
            let values: Vec<i64> = if owner == me {
                owned
                    .iter()
                    .map(|&i| problem.orders[i])
                    .flat_map(|o| [o.origin, o.destination, o.volume].map(i64::from))
                    .collect()
            } else {
                vec![]
            };
            let shared = session.input_many(owner, &values, 3 * owned.len()).await?;
            debug!("Uploaded {} orders of party {owner}", owned.len());
            for (&i, o) in owned.iter().zip(shared.chunks_exact(3)) {
                orders[i] = Some(SecretOrder {
                    origin: o[0],
                    destination: o[1],
                    volume: o[2],
                    processed: session.constant(0),
                    process_this_round: session.constant(0),
                    freighter_id: session.constant(dummy_freighter_id),
                });
            }
        }

        let owned: Vec<usize> = (0..problem.trucks.len())
            .filter(|&i| problem.trucks[i].owner == owner)
            .collect();
        if !owned.is_empty() {
            let values: Vec<i64> = if owner == me {
                owned
                    .iter()
                    .map(|&i| problem.trucks[i])
                    .flat_map(|t| [t.capacity, t.position, t.freighter].map(i64::from))
                    .collect()
            } else {
                vec![]
            };
            let shared = session.input_many(owner, &values, 3 * owned.len()).await?;
            debug!("Uploaded {} trucks of party {owner}", owned.len());
            for (&i, t) in owned.iter().zip(shared.chunks_exact(3)) {
                trucks[i] = Some(SecretTruck {
                    capacity: t[0],
                    full_capacity: t[0],
                    position: t[1],
                    destination: session.constant(dummy_node),
                    freighter_id: t[2],
                    dist_to_order: None,
                });
            }
        }
    }

    let route_matrix = problem
        .route_matrix
        .rows()
        .iter()
        .map(|row| row.iter().map(|&c| session.constant(c as i64)).collect())
        .collect();

    Ok(Fleet {
        trucks: trucks.into_iter().flatten().collect(),
        orders: orders.into_iter().flatten().collect(),
        empty_drives: vec![],
        route_matrix,
        dummy_node,
        dummy_freighter_id,
    })
}

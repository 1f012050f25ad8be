//! Empty drives: moving the truck closest to the first open order to the order's origin.
//!
//! None of these steps learns which order is the first open one, where it is, or which truck is
//! moved. Lookups by a secret index touch every entry.

use std::time::Instant;

use tracing::debug;

use crate::{
    channel::Channel,
    dispatch::state::{EmptyDrive, Fleet, SecretOrder, SecretTruck},
    mpc::{Error, SecretInt, Session},
    oblivious::{first_nonzero_mask, indicator_vector},
};

/// Returns the origin of the first order that is not processed yet, both as a node id and as an
/// indicator vector over all nodes.
pub(crate) async fn locate_first_unprocessed_origin(
    session: &mut Session<impl Channel>,
    orders: &[SecretOrder],
    num_nodes: usize,
) -> Result<(SecretInt, Vec<SecretInt>), Error> {
    let unprocessed: Vec<SecretInt> = orders.iter().map(|o| 1 - o.processed).collect();
    let first = first_nonzero_mask(session, &unprocessed).await?;
    let origins: Vec<SecretInt> = orders.iter().map(|o| o.origin).collect();
    let origin = session.dot(&first, &origins).await?;
    let origin_vec = indicator_vector(session, num_nodes, origin).await?;
    Ok((origin, origin_vec))
}

/// Stores the driving cost from every truck's position to the target node in `dist_to_order`.
pub(crate) async fn find_distances_to_order(
    session: &mut Session<impl Channel>,
    trucks: &mut [SecretTruck],
    route_matrix: &[Vec<SecretInt>],
    target: &[SecretInt],
) -> Result<(), Error> {
    // costs from every node to the target, as a column vector
    let to_target = session
        .matrix_product(route_matrix, &[target.to_vec()], true)
        .await?;
    for truck in trucks.iter_mut() {
        find_truck_dist_to_order(session, truck, &to_target).await?;
    }
    Ok(())
}

/// Looks up the truck's row of the `to_target` column without revealing its position.
pub(crate) async fn find_truck_dist_to_order(
    session: &mut Session<impl Channel>,
    truck: &mut SecretTruck,
    to_target: &[Vec<SecretInt>],
) -> Result<(), Error> {
    let position_vec = indicator_vector(session, to_target.len(), truck.position).await?;
    let distance = session
        .matrix_product(&[position_vec], to_target, false)
        .await?;
    truck.dist_to_order = distance.first().and_then(|row| row.first()).copied();
    Ok(())
}

/// The position of the truck at the secret `index`, the dummy node if there is none.
pub(crate) async fn find_truck_position(
    session: &mut Session<impl Channel>,
    trucks: &[SecretTruck],
    index: SecretInt,
    dummy_node: i64,
) -> Result<SecretInt, Error> {
    let selectors = indicator_vector(session, trucks.len(), index).await?;
    let mut position = session.constant(dummy_node);
    for (truck, is_selected) in trucks.iter().zip(selectors) {
        position = session.select(is_selected, truck.position, position).await?;
    }
    Ok(position)
}

/// The freighter id of the truck at the secret `index`, the dummy freighter id if there is none.
pub(crate) async fn find_freighter_id(
    session: &mut Session<impl Channel>,
    trucks: &[SecretTruck],
    index: SecretInt,
    dummy_freighter_id: i64,
) -> Result<SecretInt, Error> {
    let selectors = indicator_vector(session, trucks.len(), index).await?;
    let mut freighter_id = session.constant(dummy_freighter_id);
    for (truck, is_selected) in trucks.iter().zip(selectors) {
        freighter_id = session
            .select(is_selected, truck.freighter_id, freighter_id)
            .await?;
    }
    Ok(freighter_id)
}

/// Sets the position of the truck at the secret `index` to `destination`.
pub(crate) async fn move_truck(
    session: &mut Session<impl Channel>,
    trucks: &mut [SecretTruck],
    index: SecretInt,
    destination: SecretInt,
) -> Result<(), Error> {
    let selectors = indicator_vector(session, trucks.len(), index).await?;
    let choices: Vec<_> = trucks
        .iter()
        .zip(selectors)
        .map(|(truck, is_selected)| (is_selected, destination, truck.position))
        .collect();
    let positions = session.select_many(&choices).await?;
    for (truck, position) in trucks.iter_mut().zip(positions) {
        truck.position = position;
    }
    Ok(())
}

/// Moves the truck closest to the first unprocessed order to the order's origin and records the
/// drive.
pub(crate) async fn create_empty_drive(
    session: &mut Session<impl Channel>,
    fleet: &mut Fleet,
) -> Result<(), Error> {
    let now = Instant::now();
    debug!("Locating first unprocessed origin");
    let (origin, origin_vec) =
        locate_first_unprocessed_origin(session, &fleet.orders, fleet.num_nodes()).await?;

    debug!("Finding distance of each truck to first unprocessed order");
    find_distances_to_order(session, &mut fleet.trucks, &fleet.route_matrix, &origin_vec).await?;
    let distances: Vec<SecretInt> = fleet
        .trucks
        .iter_mut()
        .filter_map(|t| t.dist_to_order.take())
        .collect();
    if distances.len() != fleet.trucks.len() {
        return Err(Error::LengthMismatch {
            expected: fleet.trucks.len(),
            actual: distances.len(),
        });
    }

    debug!("Identifying closest truck to first unprocessed order");
    let (closest, _) = session.argmin(&distances).await?;

    debug!("Obtaining position and freighter id of closest truck");
    let closest_position =
        find_truck_position(session, &fleet.trucks, closest, fleet.dummy_node).await?;
    let freighter_id =
        find_freighter_id(session, &fleet.trucks, closest, fleet.dummy_freighter_id).await?;
    fleet.empty_drives.push(EmptyDrive {
        freighter_id,
        closest_position,
        destination: origin,
    });

    debug!("Updating truck location");
    move_truck(session, &mut fleet.trucks, closest, origin).await?;
    debug!(
        "Elapsed time for creation of empty truck drive: {:?}",
        now.elapsed()
    );
    Ok(())
}

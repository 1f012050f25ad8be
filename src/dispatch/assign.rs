//! Greedy assignment of orders to trucks, one fill pass per round.

use std::time::Instant;

use tracing::debug;

use crate::{
    channel::Channel,
    dispatch::state::{Fleet, SecretOrder, SecretTruck},
    mpc::{Error, Session},
    oblivious::{secure_or, secure_or_many},
};

/// Assigns the order to the truck if the two are compatible, and leaves both unchanged otherwise.
///
/// The order is compatible if it is still open, starts where the truck stands, goes where the
/// truck already goes (or the truck has no destination yet) and fits into the remaining capacity.
/// The updates are always computed, selected by the secret compatibility bit.
pub(crate) async fn fill_truck_with_order(
    session: &mut Session<impl Channel>,
    truck: &mut SecretTruck,
    order: &mut SecretOrder,
    dummy_node: i64,
) -> Result<(), Error> {
    let dummy = session.constant(dummy_node);
    let eq = session
        .eq_many(&[
            (truck.position, order.origin),
            (truck.destination, dummy),
            (truck.destination, order.destination),
        ])
        .await?;
    let (equal_positions, no_destination, same_destination) = (eq[0], eq[1], eq[2]);
    let zero = session.constant(0);
    let fits = session.ge(truck.capacity - order.volume, zero).await?;
    let destinations_compatible = secure_or(session, no_destination, same_destination).await?;
    let order_is_open = 1 - order.processed;
    let partial = session
        .mul_many(&[
            (equal_positions, destinations_compatible),
            (fits, order_is_open),
        ])
        .await?;
    let compatible = session.mul(partial[0], partial[1]).await?;

    let selected = session
        .select_many(&[
            (compatible, order.destination, truck.destination),
            (compatible, truck.freighter_id, order.freighter_id),
        ])
        .await?;
    truck.destination = selected[0];
    order.freighter_id = selected[1];
    let flags = secure_or_many(
        session,
        &[
            (compatible, order.processed),
            (compatible, order.process_this_round),
        ],
    )
    .await?;
    order.processed = flags[0];
    order.process_this_round = flags[1];
    let load = session.mul(order.volume, compatible).await?;
    truck.capacity = truck.capacity - load;
    Ok(())
}

/// Runs every truck against every order, then moves every truck to its committed destination.
///
/// Trucks are processed one after another, since a truck's capacity and destination carry over
/// from one order to the next.
pub(crate) async fn fill_trucks(
    session: &mut Session<impl Channel>,
    fleet: &mut Fleet,
) -> Result<(), Error> {
    let now = Instant::now();
    let dummy_node = fleet.dummy_node;
    for truck in fleet.trucks.iter_mut() {
        for order in fleet.orders.iter_mut() {
            fill_truck_with_order(session, truck, order, dummy_node).await?;
        }
        truck.capacity = truck.full_capacity;
        let dummy = session.constant(dummy_node);
        let has_destination = 1 - session.eq(truck.destination, dummy).await?;
        truck.position = session
            .select(has_destination, truck.destination, truck.position)
            .await?;
        truck.destination = dummy;
    }
    debug!("Elapsed time for the filling of trucks: {:?}", now.elapsed());
    Ok(())
}

//! The dispatch algorithm: greedy fill rounds, empty drives on stalls and the scoped reveal.
//!
//! A run is driven by a [`Dispatcher`], one per computing party. Each round runs every truck
//! against every order and opens the number of orders that were newly assigned. If that number
//! is zero, the truck closest to the first open order makes an empty drive to the order's origin.
//! Once all orders are assigned, the results are revealed.

use std::{collections::HashMap, time::Instant};

use serde::{Deserialize, Serialize};
use tracing::{Level, debug, info, instrument};

use crate::{
    channel::Channel,
    config::{ConfigError, DispatchConfig},
    mpc::{self, Session, simulate},
    problem::Problem,
};

mod assign;
mod reposition;
mod state;

use assign::fill_trucks;
use reposition::create_empty_drive;
use state::{Fleet, upload};

/// Errors that can occur during a dispatch run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configuration or the problem was rejected before anything was shared.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// The secret-shared computation failed.
    #[error("secret-shared computation failed: {0}")]
    Mpc(#[from] mpc::Error),
    /// The session compares values of a different bit length than configured.
    #[error("the session uses {session} bits, but {config} bits are configured")]
    BitLengthMismatch {
        /// The bit length of the session.
        session: u32,
        /// The configured bit length.
        config: u32,
    },
    /// Some orders could not be assigned within the configured number of rounds.
    #[error("no feasible assignment after {rounds} rounds, {remaining} orders are still open")]
    NoFeasibleAssignment {
        /// The number of rounds that were run.
        rounds: usize,
        /// The number of orders that are still open.
        remaining: usize,
    },
    /// The results were requested before all orders were assigned.
    #[error("{remaining} orders are still open")]
    NotSolved {
        /// The number of orders that are still open.
        remaining: usize,
    },
    /// A revealed freighter id does not belong to any freighter of the problem.
    #[error("the revealed freighter id {0} does not belong to any freighter")]
    UnknownFreighter(i64),
    /// A revealed value is not a valid id or quantity.
    #[error("the revealed value {0} is out of range")]
    ValueOutOfRange(i64),
}

/// What happened in a single round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundReport {
    /// The number of the round, starting at 1.
    pub round: usize,
    /// The number of orders assigned in this round (the only value revealed during the run).
    pub newly_processed: usize,
    /// Whether an empty drive was created because no order was assigned.
    pub repositioned: bool,
}

/// The private details of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetails {
    /// The pickup node.
    pub origin: u32,
    /// The delivery node.
    pub destination: u32,
    /// The volume to transport.
    pub volume: u32,
}

/// The freighter an order was assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAssignment {
    /// The index of the order in the problem.
    pub order: usize,
    /// The id of the freighter transporting the order.
    pub freighter: u32,
    /// Only known to the owner of the order and to the party of the assigned freighter.
    pub details: Option<OrderDetails>,
}

/// The start and end of an empty drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// The node the truck starts from.
    pub from: u32,
    /// The node the truck drives to, the origin of an open order.
    pub to: u32,
}

/// An empty drive of a truck of the given freighter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealedEmptyDrive {
    /// The id of the freighter whose truck drives.
    pub freighter: u32,
    /// Only known to the party of the freighter.
    pub route: Option<Route>,
}

/// Everything a party learns from a dispatch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    /// The party that received this outcome.
    pub party: usize,
    /// The number of rounds it took to assign all orders.
    pub rounds: usize,
    /// The assignment of every order, in problem order.
    pub orders: Vec<OrderAssignment>,
    /// The empty drives, in the order they were created.
    pub empty_drives: Vec<RevealedEmptyDrive>,
}

/// Drives the rounds of a dispatch run for a single party.
pub struct Dispatcher<'a, C: Channel> {
    session: Session<C>,
    config: DispatchConfig,
    problem: &'a Problem,
    fleet: Fleet,
    round: usize,
    processed: usize,
}

impl<'a, C: Channel> Dispatcher<'a, C> {
    /// Validates the problem and secret-shares it among all parties.
    ///
    /// Only the private fields of the trucks and orders owned by this party are read, the other
    /// parties' entries may hold placeholders.
    pub async fn new(
        session: Session<C>,
        config: &DispatchConfig,
        problem: &'a Problem,
    ) -> Result<Self, Error> {
        problem.validate(config, session.parties())?;
        problem.validate_owned(config, session.party())?;
        if session.bit_length() != config.bit_length {
            return Err(Error::BitLengthMismatch {
                session: session.bit_length(),
                config: config.bit_length,
            });
        }
        let now = Instant::now();
        let fleet = upload(&session, config, problem).await?;
        debug!("Elapsed time for the upload: {:?}", now.elapsed());
        Ok(Self {
            session,
            config: config.clone(),
            problem,
            fleet,
            round: 0,
            processed: 0,
        })
    }

    /// The number of rounds run so far.
    pub fn rounds(&self) -> usize {
        self.round
    }

    /// The number of orders that are not assigned yet.
    pub fn remaining(&self) -> usize {
        self.fleet.orders.len() - self.processed
    }

    /// Runs a fill pass and, if it assigned no order, an empty drive.
    ///
    /// Does nothing once all orders are assigned.
    #[instrument(level = Level::DEBUG, skip_all, err)]
    pub async fn run_round(&mut self) -> Result<RoundReport, Error> {
        if self.remaining() == 0 {
            return Ok(RoundReport {
                round: self.round,
                newly_processed: 0,
                repositioned: false,
            });
        }
        self.round += 1;
        info!("Filling trucks...");
        info!("Orders to go: {}", self.remaining());
        fill_trucks(&mut self.session, &mut self.fleet).await?;

        let added = self
            .fleet
            .orders
            .iter()
            .fold(self.session.constant(0), |sum, o| sum + o.process_this_round);
        let added = self.session.open(added).await?;
        let newly_processed = match usize::try_from(added) {
            Ok(n) if n <= self.remaining() => n,
            _ => return Err(Error::ValueOutOfRange(added)),
        };
        debug!("Orders processed in this round: {newly_processed}");

        let repositioned = newly_processed == 0;
        if repositioned {
            info!("Creating empty truck drive...");
            create_empty_drive(&mut self.session, &mut self.fleet).await?;
        }
        for order in self.fleet.orders.iter_mut() {
            order.process_this_round = self.session.constant(0);
        }
        self.processed += newly_processed;
        Ok(RoundReport {
            round: self.round,
            newly_processed,
            repositioned,
        })
    }

    /// Runs rounds until every order is assigned, returns the number of rounds.
    #[instrument(level = Level::DEBUG, skip_all, err)]
    pub async fn solve(&mut self) -> Result<usize, Error> {
        debug!(
            "Running solver for {} orders, {} trucks, {} freighters",
            self.fleet.orders.len(),
            self.fleet.trucks.len(),
            self.problem.freighters.len()
        );
        let now = Instant::now();
        while self.remaining() > 0 {
            if self.round >= self.config.max_rounds {
                return Err(Error::NoFeasibleAssignment {
                    rounds: self.round,
                    remaining: self.remaining(),
                });
            }
            self.run_round().await?;
        }
        debug!("Total elapsed time for solving: {:?}", now.elapsed());
        Ok(self.round)
    }

    /// Reveals the assignments to all parties, and the details of orders and empty drives only to
    /// the parties involved.
    pub async fn reveal(&mut self) -> Result<DispatchOutcome, Error> {
        if self.remaining() > 0 {
            return Err(Error::NotSolved {
                remaining: self.remaining(),
            });
        }
        let parties = self.problem.freighter_parties();
        let ids: Vec<_> = self
            .fleet
            .orders
            .iter()
            .map(|o| o.freighter_id)
            .chain(self.fleet.empty_drives.iter().map(|d| d.freighter_id))
            .collect();
        let ids = self.session.open_many(&ids).await?;
        let (order_ids, drive_ids) = ids.split_at(self.fleet.orders.len());

        let mut orders = Vec::with_capacity(order_ids.len());
        for (i, (order, &id)) in self.fleet.orders.iter().zip(order_ids).enumerate() {
            let (freighter, party) = freighter_of(&parties, id)?;
            info!("Order {i} is assigned to freighter {freighter}");
            let recipients = [self.problem.orders[i].owner, party];
            let details = self
                .session
                .reveal_many(&[order.origin, order.destination, order.volume], &recipients)
                .await?;
            let details = match details.as_deref() {
                Some(&[origin, destination, volume]) => Some(OrderDetails {
                    origin: to_u32(origin)?,
                    destination: to_u32(destination)?,
                    volume: to_u32(volume)?,
                }),
                _ => None,
            };
            orders.push(OrderAssignment {
                order: i,
                freighter,
                details,
            });
        }

        let mut empty_drives = Vec::with_capacity(drive_ids.len());
        for (drive, &id) in self.fleet.empty_drives.iter().zip(drive_ids) {
            let (freighter, party) = freighter_of(&parties, id)?;
            let route = self
                .session
                .reveal_many(&[drive.closest_position, drive.destination], &[party])
                .await?;
            let route = match route.as_deref() {
                Some(&[from, to]) => Some(Route {
                    from: to_u32(from)?,
                    to: to_u32(to)?,
                }),
                _ => None,
            };
            empty_drives.push(RevealedEmptyDrive { freighter, route });
        }

        Ok(DispatchOutcome {
            party: self.session.party(),
            rounds: self.round,
            orders,
            empty_drives,
        })
    }

    /// Ends the run, releasing the dealer.
    pub async fn finish(self) -> Result<(), Error> {
        self.session.finish().await?;
        Ok(())
    }
}

fn to_u32(value: i64) -> Result<u32, Error> {
    u32::try_from(value).map_err(|_| Error::ValueOutOfRange(value))
}

fn freighter_of(parties: &HashMap<u32, usize>, id: i64) -> Result<(u32, usize), Error> {
    u32::try_from(id)
        .ok()
        .and_then(|freighter| Some((freighter, *parties.get(&freighter)?)))
        .ok_or(Error::UnknownFreighter(id))
}

/// Runs a complete dispatch for the party of the session: upload, rounds and reveal.
pub async fn dispatch(
    session: Session<impl Channel>,
    config: &DispatchConfig,
    problem: &Problem,
) -> Result<DispatchOutcome, Error> {
    let mut dispatcher = Dispatcher::new(session, config, problem).await?;
    dispatcher.solve().await?;
    let outcome = dispatcher.reveal().await?;
    dispatcher.finish().await?;
    Ok(outcome)
}

/// Simulates a dispatch run of `parties` computing parties and the dealer in-process.
///
/// Returns the outcome of every party, in party order.
pub async fn simulate_dispatch(
    problem: &Problem,
    config: &DispatchConfig,
    parties: usize,
) -> Result<Vec<DispatchOutcome>, Error> {
    problem.validate_all(config, parties)?;
    simulate(parties, config.bit_length, async |session| {
        dispatch(session, config, problem).await
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        channel::SimpleChannel,
        problem::{Freighter, Order, RouteMatrix, Truck},
    };

    fn line(num_nodes: u32) -> RouteMatrix {
        RouteMatrix::new(
            (0..num_nodes)
                .map(|a| (0..num_nodes).map(|b| a.abs_diff(b)).collect())
                .collect(),
        )
    }

    fn config() -> DispatchConfig {
        DispatchConfig {
            dummy_node: 15,
            dummy_freighter_id: 15,
            bit_length: 4,
            max_rounds: 10,
        }
    }

    /// A single truck of freighter 2 (party 1) at node 0 and one order of party 0 from 2 to 1.
    fn stalled() -> Problem {
        Problem {
            freighters: vec![Freighter { id: 2, party: 1 }],
            trucks: vec![Truck {
                owner: 1,
                freighter: 2,
                position: 0,
                capacity: 6,
            }],
            orders: vec![Order {
                owner: 0,
                origin: 2,
                destination: 1,
                volume: 6,
            }],
            route_matrix: line(3),
        }
    }

    #[tokio::test]
    async fn stalled_round_creates_one_empty_drive() -> Result<(), Error> {
        let problem = stalled();
        let config = config();
        let results = simulate(2, 4, async |session: Session<SimpleChannel>| {
            let mut dispatcher = Dispatcher::new(session, &config, &problem).await?;
            let first = dispatcher.run_round().await?;
            let drives = dispatcher.fleet.empty_drives.len();
            let position = dispatcher.fleet.trucks[0].position;
            let position = dispatcher.session.open(position).await?;
            let second = dispatcher.run_round().await?;
            let done = dispatcher.run_round().await?;
            let outcome = dispatcher.reveal().await?;
            dispatcher.finish().await?;
            Ok::<_, Error>((first, drives, position, second, done, outcome))
        })
        .await?;
        for (party, (first, drives, position, second, done, outcome)) in
            results.into_iter().enumerate()
        {
            assert_eq!(
                first,
                RoundReport {
                    round: 1,
                    newly_processed: 0,
                    repositioned: true
                }
            );
            assert_eq!(drives, 1);
            assert_eq!(position, 2);
            assert_eq!(
                second,
                RoundReport {
                    round: 2,
                    newly_processed: 1,
                    repositioned: false
                }
            );
            assert_eq!(done.round, 2);
            assert_eq!(outcome.rounds, 2);
            let details = OrderDetails {
                origin: 2,
                destination: 1,
                volume: 6,
            };
            assert_eq!(
                outcome.orders,
                vec![OrderAssignment {
                    order: 0,
                    freighter: 2,
                    details: Some(details)
                }]
            );
            let route = (party == 1).then_some(Route { from: 0, to: 2 });
            assert_eq!(
                outcome.empty_drives,
                vec![RevealedEmptyDrive {
                    freighter: 2,
                    route
                }]
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn details_only_reach_owner_and_assigned_freighter() -> Result<(), Error> {
        let order = |owner, origin, destination| Order {
            owner,
            origin,
            destination,
            volume: 3,
        };
        let problem = Problem {
            freighters: vec![Freighter { id: 1, party: 0 }, Freighter { id: 2, party: 1 }],
            trucks: vec![
                Truck {
                    owner: 0,
                    freighter: 1,
                    position: 0,
                    capacity: 3,
                },
                Truck {
                    owner: 1,
                    freighter: 2,
                    position: 2,
                    capacity: 3,
                },
            ],
            orders: vec![order(2, 0, 1), order(2, 2, 3)],
            route_matrix: line(4),
        };
        let outcomes = simulate_dispatch(&problem, &config(), 3).await?;
        assert_eq!(outcomes.len(), 3);
        for outcome in &outcomes {
            assert_eq!(outcome.rounds, 1);
            assert!(outcome.empty_drives.is_empty());
            let freighters: Vec<_> = outcome.orders.iter().map(|o| o.freighter).collect();
            assert_eq!(freighters, vec![1, 2]);
        }
        let visible = |party: usize| -> Vec<bool> {
            outcomes[party]
                .orders
                .iter()
                .map(|o| o.details.is_some())
                .collect()
        };
        assert_eq!(visible(0), vec![true, false]);
        assert_eq!(visible(1), vec![false, true]);
        assert_eq!(visible(2), vec![true, true]);
        assert_eq!(
            outcomes[2].orders[1].details,
            Some(OrderDetails {
                origin: 2,
                destination: 3,
                volume: 3
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_capacity_hits_the_round_limit() {
        let mut problem = stalled();
        problem.orders[0].volume = 7;
        let config = DispatchConfig {
            max_rounds: 3,
            ..config()
        };
        let result = simulate_dispatch(&problem, &config, 2).await;
        assert!(matches!(
            result,
            Err(Error::NoFeasibleAssignment {
                rounds: 3,
                remaining: 1
            })
        ));
    }

    #[tokio::test]
    async fn invalid_problems_are_rejected_before_sharing() {
        let mut problem = stalled();
        problem.trucks[0].capacity = 16;
        let result = simulate_dispatch(&problem, &config(), 2).await;
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::ValueTooLarge { .. }))
        ));
    }

    #[tokio::test]
    async fn empty_problem_needs_no_rounds() -> Result<(), Error> {
        let problem = Problem {
            freighters: vec![],
            trucks: vec![],
            orders: vec![],
            route_matrix: line(2),
        };
        let outcomes = simulate_dispatch(&problem, &config(), 2).await?;
        for outcome in outcomes {
            assert_eq!(outcome.rounds, 0);
            assert!(outcome.orders.is_empty());
        }
        Ok(())
    }
}

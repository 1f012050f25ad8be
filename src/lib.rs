//! Oblivious multi-freighter truck dispatch on top of secret-shared arithmetic.
//!
//! Several competing freighters want to share their trucks for delivering each other's orders,
//! without disclosing truck positions, capacities or order contents to their competitors. Inputs
//! are secret-shared among a set of computing parties, the dispatch algorithm runs on the shares
//! and only the final assignments (and the routes, to the parties allowed to see them) are
//! revealed.
//!
//! ## Main Components
//!
//! * [`mpc`]: Additive secret sharing with a preprocessing dealer, offering the arithmetic
//!   ([`mpc::SecretInt`], [`mpc::Session`]) the dispatch algorithm is written against.
//! * [`oblivious`]: Small building blocks (OR, indicator vectors, first non-zero entry) that
//!   replace branching and indexing on secret values.
//! * [`dispatch`]: The greedy assignment of orders to trucks, the repositioning of trucks when no
//!   progress is made, and the scoped reveal of the results.
//! * [`channel`]: Communication abstractions for exchanging data between parties.
//! * [`problem`] and [`config`]: The plaintext problem instance and the parameters of a run.
//!
//! ## Basic Usage
//!
//! Every computing party creates a [`mpc::Session`] over a [`channel::Channel`] and calls
//! [`dispatch::dispatch`] with the same configuration and the same public problem structure,
//! filling in the private values it owns. For simulated environments (testing/development), you
//! can use [`dispatch::simulate_dispatch`], which runs all parties and the dealer in-process:
//!
//! ```ignore
//! use mupol::{config::DispatchConfig, dispatch::simulate_dispatch, problem::Problem};
//!
//! # async fn example(problem: Problem) -> Result<(), Box<dyn std::error::Error>> {
//! let outcomes = simulate_dispatch(&problem, &DispatchConfig::default(), 3).await?;
//! for assignment in &outcomes[0].orders {
//!     println!("Order {} goes to freighter {}", assignment.order, assignment.freighter);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Security Properties
//!
//! The sequence of operations executed by every party never depends on a secret value. The only
//! value revealed before the end of a run is the number of orders assigned in every round.
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod channel;
pub mod config;
pub mod dispatch;
pub mod mpc;
pub mod oblivious;
pub mod problem;

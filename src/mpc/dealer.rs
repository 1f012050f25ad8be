//! The preprocessing dealer as a (semi-)trusted party, providing correlated randomness.
//!
//! The dealer never sees any input or intermediate value of the computation. It only hands out
//! fresh additive sharings of Beaver triples and of random comparison masks, in batches requested
//! by the computing parties.

use futures::future::try_join_all;
use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use tracing::{Level, debug, instrument};

use crate::{
    channel::{self, Channel, recv_from, send_to},
    mpc::{
        MAX_BIT_LENGTH, STATISTICAL_SECURITY,
        data_types::{ComparisonMask, Fp, Triple, share_value},
    },
};

/// Errors that can occur while executing the dealer.
#[derive(Debug)]
pub enum Error {
    /// The parties requested different preprocessing material.
    RequestMismatch(String, String),
    /// A comparison mask with an unsupported number of bits was requested.
    InvalidBitLength(u32),
    /// An error occurred while trying to communicate over the channel.
    Channel(channel::Error),
    /// A message was sent, but it contained no data.
    EmptyMsg,
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::RequestMismatch(a, b) => write!(f, "Parties requested {a} vs {b}"),
            Error::InvalidBitLength(bits) => write!(f, "Unsupported mask bit length {bits}"),
            Error::Channel(e) => write!(f, "Channel error: {e:?}"),
            Error::EmptyMsg => f.write_str("The message sent by the other party was empty"),
        }
    }
}

impl From<channel::Error> for Error {
    fn from(e: channel::Error) -> Self {
        Error::Channel(e)
    }
}

/// Preprocessing material requested by every computing party in lockstep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum Request {
    /// A batch of Beaver triples.
    Triples(u32),
    /// A batch of comparison masks with the given number of low bits.
    ComparisonMasks { count: u32, bits: u32 },
    /// The party is done and will not request anything else.
    Done,
}

/// The dealer's answer to a [`Request`], different for every party.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum Response {
    Triples(Vec<Triple>),
    ComparisonMasks(Vec<ComparisonMask>),
    Abort(String),
}

/// Runs the dealer, serving requests until every computing party is done.
///
/// The dealer is expected to be reachable under the index `parties` on the channel, the computing
/// parties use the indices `0..parties`.
#[instrument(level = Level::DEBUG, skip_all, err)]
pub async fn dealer(channel: &impl Channel, parties: usize) -> Result<(), Error> {
    debug!("Dealer serving {parties} parties");
    let mut served = 0usize;
    loop {
        let requests: Vec<Request> = try_join_all((0..parties).map(async |p| {
            recv_from(channel, p, "request (dealer)")
                .await?
                .pop()
                .ok_or(Error::EmptyMsg)
        }))
        .await?;

        for window in requests.windows(2) {
            let [a, b] = window else {
                unreachable!("window is size 2")
            };
            if a != b {
                let e = Error::RequestMismatch(format!("{a:?}"), format!("{b:?}"));
                let abort = [Response::Abort(e.to_string())];
                try_join_all(
                    (0..parties)
                        .map(async |p| send_to(channel, p, "response (dealer)", &abort).await),
                )
                .await?;
                return Err(e);
            }
        }

        let Some(request) = requests.into_iter().next() else {
            return Ok(());
        };
        let responses = match request {
            Request::Done => {
                debug!("Dealer done after serving {served} requests");
                return Ok(());
            }
            Request::Triples(count) => triples(parties, count as usize),
            Request::ComparisonMasks { count, bits } => {
                if bits == 0 || bits > MAX_BIT_LENGTH {
                    let e = Error::InvalidBitLength(bits);
                    let abort = [Response::Abort(e.to_string())];
                    try_join_all(
                        (0..parties)
                            .map(async |p| send_to(channel, p, "response (dealer)", &abort).await),
                    )
                    .await?;
                    return Err(e);
                }
                comparison_masks(parties, count as usize, bits)
            }
        };
        try_join_all(
            responses
                .into_iter()
                .enumerate()
                .map(async |(p, response)| {
                    send_to(channel, p, "response (dealer)", &[response]).await
                }),
        )
        .await?;
        served += 1;
    }
}

fn triples(parties: usize, count: usize) -> Vec<Response> {
    let mut rng = rng();
    let mut per_party = vec![Vec::with_capacity(count); parties];
    for _ in 0..count {
        let a = Fp::random(&mut rng);
        let b = Fp::random(&mut rng);
        let a_shares = share_value(a, parties, &mut rng);
        let b_shares = share_value(b, parties, &mut rng);
        let c_shares = share_value(a * b, parties, &mut rng);
        for (p, triples) in per_party.iter_mut().enumerate() {
            triples.push(Triple {
                a: a_shares[p],
                b: b_shares[p],
                c: c_shares[p],
            });
        }
    }
    per_party.into_iter().map(Response::Triples).collect()
}

fn comparison_masks(parties: usize, count: usize, bits: u32) -> Vec<Response> {
    let mut rng = rng();
    let mut per_party = vec![Vec::with_capacity(count); parties];
    for _ in 0..count {
        let bit_shares: Vec<Vec<Fp>> = (0..bits)
            .map(|_| {
                let bit = if rng.random::<bool>() { Fp::ONE } else { Fp::ZERO };
                share_value(bit, parties, &mut rng)
            })
            .collect();
        let high = Fp::new(rng.random_range(0..(1u64 << (STATISTICAL_SECURITY + 1))));
        let high_shares = share_value(high, parties, &mut rng);
        for (p, masks) in per_party.iter_mut().enumerate() {
            masks.push(ComparisonMask {
                bits: bit_shares.iter().map(|shares| shares[p]).collect(),
                high: high_shares[p],
            });
        }
    }
    per_party.into_iter().map(Response::ComparisonMasks).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::SimpleChannel;

    fn sum(shares: impl IntoIterator<Item = Fp>) -> Fp {
        shares.into_iter().fold(Fp::ZERO, |acc, s| acc + s)
    }

    #[tokio::test]
    async fn triples_are_multiplicative() -> Result<(), Error> {
        let parties = 3;
        let mut channels = SimpleChannel::channels(parties + 1);
        let dealer_channel = channels.pop().unwrap();
        let dealer_fut = dealer(&dealer_channel, parties);
        let parties_fut = async {
            for ch in &channels {
                send_to(ch, parties, "request (dealer)", &[Request::Triples(5)]).await?;
            }
            let mut all = vec![];
            for ch in &channels {
                let mut r: Vec<Response> = recv_from(ch, parties, "response (dealer)").await?;
                match r.pop() {
                    Some(Response::Triples(t)) => all.push(t),
                    other => panic!("unexpected response {other:?}"),
                }
            }
            for ch in &channels {
                send_to(ch, parties, "request (dealer)", &[Request::Done]).await?;
            }
            Ok::<_, Error>(all)
        };
        let ((), all) = futures::future::try_join(dealer_fut, parties_fut).await?;
        for i in 0..5 {
            let a = sum(all.iter().map(|t| t[i].a));
            let b = sum(all.iter().map(|t| t[i].b));
            let c = sum(all.iter().map(|t| t[i].c));
            assert_eq!(a * b, c);
        }
        Ok(())
    }

    #[tokio::test]
    async fn masks_consist_of_bits() -> Result<(), Error> {
        let parties = 2;
        let mut channels = SimpleChannel::channels(parties + 1);
        let dealer_channel = channels.pop().unwrap();
        let request = Request::ComparisonMasks { count: 4, bits: 6 };
        let dealer_fut = dealer(&dealer_channel, parties);
        let parties_fut = async {
            for ch in &channels {
                send_to(ch, parties, "request (dealer)", &[request.clone()]).await?;
            }
            let mut all = vec![];
            for ch in &channels {
                let mut r: Vec<Response> = recv_from(ch, parties, "response (dealer)").await?;
                match r.pop() {
                    Some(Response::ComparisonMasks(m)) => all.push(m),
                    other => panic!("unexpected response {other:?}"),
                }
            }
            for ch in &channels {
                send_to(ch, parties, "request (dealer)", &[Request::Done]).await?;
            }
            Ok::<_, Error>(all)
        };
        let ((), all) = futures::future::try_join(dealer_fut, parties_fut).await?;
        for i in 0..4 {
            for bit in 0..6 {
                let b = sum(all.iter().map(|m| m[i].bits[bit]));
                assert!(b == Fp::ZERO || b == Fp::ONE);
            }
            let high = sum(all.iter().map(|m| m[i].high));
            assert!(high.value() < 1 << (STATISTICAL_SECURITY + 1));
        }
        Ok(())
    }

    #[tokio::test]
    async fn mismatching_requests_abort_all_parties() -> Result<(), channel::Error> {
        let parties = 2;
        let mut channels = SimpleChannel::channels(parties + 1);
        let dealer_channel = channels.pop().unwrap();
        let dealer_fut = dealer(&dealer_channel, parties);
        let parties_fut = async {
            send_to(&channels[0], parties, "request (dealer)", &[Request::Triples(1)]).await?;
            send_to(&channels[1], parties, "request (dealer)", &[Request::Triples(2)]).await?;
            let mut aborts = 0;
            for ch in &channels {
                let mut r: Vec<Response> = recv_from(ch, parties, "response (dealer)").await?;
                if let Some(Response::Abort(_)) = r.pop() {
                    aborts += 1;
                }
            }
            Ok::<_, channel::Error>(aborts)
        };
        let (result, aborts) = futures::future::join(dealer_fut, parties_fut).await;
        assert!(matches!(result, Err(Error::RequestMismatch(_, _))));
        assert_eq!(aborts?, 2);
        Ok(())
    }
}

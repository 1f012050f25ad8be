//! The per-party view of the shared computation.

use std::{collections::VecDeque, pin::pin};

use futures::future::{Either, select, try_join_all};
use rand::rng;
use tracing::{debug, trace};

use crate::{
    channel::{Channel, SimpleChannel, recv_from, recv_vec_from, send_to},
    mpc::{
        Error, MAX_BIT_LENGTH,
        data_types::{ComparisonMask, Fp, SecretInt, Triple, share_value},
        dealer::{self, Request, Response},
    },
};

/// The minimum number of triples / masks requested from the dealer at once.
const PREPROCESSING_BATCH: usize = 1024;

/// A computing party taking part in the shared computation.
///
/// Comparisons are correct for operands whose difference lies in `[-2^l, 2^l)`, where `l` is the
/// bit length the session was created with. Values that fit into `l` bits can therefore always be
/// compared with each other.
pub struct Session<C: Channel> {
    channel: C,
    party: usize,
    parties: usize,
    dealer: usize,
    bit_length: u32,
    triples: VecDeque<Triple>,
    masks: VecDeque<ComparisonMask>,
}

impl<C: Channel> Session<C> {
    /// Creates the session of `party` out of `parties`, with the dealer reachable as party
    /// `parties` on the channel.
    pub fn new(channel: C, party: usize, parties: usize, bit_length: u32) -> Result<Self, Error> {
        if party >= parties {
            return Err(Error::PartyDoesNotExist(party));
        }
        if bit_length == 0 || bit_length > MAX_BIT_LENGTH {
            return Err(Error::InvalidBitLength(bit_length));
        }
        Ok(Self {
            channel,
            party,
            parties,
            dealer: parties,
            bit_length,
            triples: VecDeque::new(),
            masks: VecDeque::new(),
        })
    }

    /// The index of this party.
    pub fn party(&self) -> usize {
        self.party
    }

    /// The number of computing parties (excluding the dealer).
    pub fn parties(&self) -> usize {
        self.parties
    }

    /// The bit length of values that can be compared.
    pub fn bit_length(&self) -> u32 {
        self.bit_length
    }

    /// The underlying channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    fn is_leader(&self) -> bool {
        self.party == 0
    }

    /// A sharing of a public constant, no communication needed.
    pub fn constant(&self, value: i64) -> SecretInt {
        if self.is_leader() {
            SecretInt::new(Fp::from_i64(value), true)
        } else {
            SecretInt::new(Fp::ZERO, false)
        }
    }

    /// Secret-shares a single value provided by `owner`, all other parties pass `None`.
    pub async fn input(&self, owner: usize, value: Option<i64>) -> Result<SecretInt, Error> {
        let values: Vec<i64> = value.into_iter().collect();
        let mut shared = self.input_many(owner, &values, 1).await?;
        shared.pop().ok_or(Error::EmptyVector)
    }

    /// Secret-shares `len` values provided by `owner`, all other parties pass an empty slice.
    pub async fn input_many(
        &self,
        owner: usize,
        values: &[i64],
        len: usize,
    ) -> Result<Vec<SecretInt>, Error> {
        if owner >= self.parties {
            return Err(Error::PartyDoesNotExist(owner));
        }
        let leader = self.is_leader();
        if owner != self.party {
            let shares: Vec<Fp> = recv_vec_from(&self.channel, owner, "input", len).await?;
            return Ok(shares.into_iter().map(|s| SecretInt::new(s, leader)).collect());
        }
        if values.len() != len {
            return Err(Error::WrongInputSize {
                expected: len,
                actual: values.len(),
            });
        }
        let mut per_party = vec![Vec::with_capacity(len); self.parties];
        {
            let mut rng = rng();
            for &v in values {
                let shares = share_value(Fp::from_i64(v), self.parties, &mut rng);
                for (p, share) in shares.into_iter().enumerate() {
                    per_party[p].push(share);
                }
            }
        }
        let own = std::mem::take(&mut per_party[self.party]);
        for (p, shares) in per_party.iter().enumerate() {
            if p != self.party {
                send_to(&self.channel, p, "input", shares).await?;
            }
        }
        Ok(own.into_iter().map(|s| SecretInt::new(s, leader)).collect())
    }

    async fn open_fp(&self, xs: &[SecretInt]) -> Result<Vec<Fp>, Error> {
        let shares: Vec<Fp> = xs.iter().map(|x| x.share).collect();
        let others: Vec<usize> = (0..self.parties).filter(|p| *p != self.party).collect();
        try_join_all(
            others
                .iter()
                .map(async |&p| send_to(&self.channel, p, "open", &shares).await),
        )
        .await?;
        let received: Vec<Vec<Fp>> = try_join_all(
            others
                .iter()
                .map(async |&p| recv_vec_from(&self.channel, p, "open", xs.len()).await),
        )
        .await?;
        let mut sums = shares;
        for theirs in received {
            for (sum, s) in sums.iter_mut().zip(theirs) {
                *sum = *sum + s;
            }
        }
        Ok(sums)
    }

    /// Reveals the values to every party.
    pub async fn open_many(&self, xs: &[SecretInt]) -> Result<Vec<i64>, Error> {
        Ok(self.open_fp(xs).await?.into_iter().map(Fp::to_i64).collect())
    }

    /// Reveals a single value to every party.
    pub async fn open(&self, x: SecretInt) -> Result<i64, Error> {
        let mut opened = self.open_many(&[x]).await?;
        opened.pop().ok_or(Error::EmptyVector)
    }

    /// Reveals the values to the `recipients` only, which receive `Some`, everyone else `None`.
    pub async fn reveal_many(
        &self,
        xs: &[SecretInt],
        recipients: &[usize],
    ) -> Result<Option<Vec<i64>>, Error> {
        if recipients.is_empty() {
            return Err(Error::MissingOutputParties);
        }
        if let Some(&p) = recipients.iter().find(|p| **p >= self.parties) {
            return Err(Error::PartyDoesNotExist(p));
        }
        let mut recipients = recipients.to_vec();
        recipients.sort_unstable();
        recipients.dedup();
        let shares: Vec<Fp> = xs.iter().map(|x| x.share).collect();
        for &p in recipients.iter().filter(|p| **p != self.party) {
            send_to(&self.channel, p, "reveal", &shares).await?;
        }
        if !recipients.contains(&self.party) {
            return Ok(None);
        }
        let mut sums = shares;
        for p in (0..self.parties).filter(|p| *p != self.party) {
            let theirs: Vec<Fp> = recv_vec_from(&self.channel, p, "reveal", xs.len()).await?;
            for (sum, s) in sums.iter_mut().zip(theirs) {
                *sum = *sum + s;
            }
        }
        Ok(Some(sums.into_iter().map(Fp::to_i64).collect()))
    }

    /// Reveals a single value to the `recipients` only.
    pub async fn reveal(&self, x: SecretInt, recipients: &[usize]) -> Result<Option<i64>, Error> {
        Ok(self
            .reveal_many(&[x], recipients)
            .await?
            .and_then(|mut v| v.pop()))
    }

    async fn request(&self, request: Request) -> Result<Response, Error> {
        send_to(&self.channel, self.dealer, "request (dealer)", &[request]).await?;
        let response = recv_from::<Response>(&self.channel, self.dealer, "response (dealer)")
            .await?
            .pop()
            .ok_or(Error::MissingPreprocessing)?;
        match response {
            Response::Abort(reason) => Err(Error::DealerAborted(reason)),
            response => Ok(response),
        }
    }

    async fn take_triples(&mut self, n: usize) -> Result<Vec<Triple>, Error> {
        if self.triples.len() < n {
            let count = (n - self.triples.len()).max(PREPROCESSING_BATCH);
            trace!("Requesting {count} triples");
            match self.request(Request::Triples(count as u32)).await? {
                Response::Triples(triples) if triples.len() == count => self.triples.extend(triples),
                Response::Triples(_) => return Err(Error::MissingPreprocessing),
                _ => return Err(Error::UnexpectedPreprocessing),
            }
        }
        Ok(self.triples.drain(..n).collect())
    }

    async fn take_masks(&mut self, n: usize) -> Result<Vec<ComparisonMask>, Error> {
        if self.masks.len() < n {
            let count = (n - self.masks.len()).max(PREPROCESSING_BATCH);
            trace!("Requesting {count} comparison masks");
            let request = Request::ComparisonMasks {
                count: count as u32,
                bits: self.bit_length,
            };
            match self.request(request).await? {
                Response::ComparisonMasks(masks) if masks.len() == count => {
                    if masks
                        .iter()
                        .any(|m| m.bits.len() != self.bit_length as usize)
                    {
                        return Err(Error::MissingPreprocessing);
                    }
                    self.masks.extend(masks)
                }
                Response::ComparisonMasks(_) => return Err(Error::MissingPreprocessing),
                _ => return Err(Error::UnexpectedPreprocessing),
            }
        }
        Ok(self.masks.drain(..n).collect())
    }

    /// Multiplies the pairs element-wise, in a single round of communication.
    pub async fn mul_many(
        &mut self,
        pairs: &[(SecretInt, SecretInt)],
    ) -> Result<Vec<SecretInt>, Error> {
        if pairs.is_empty() {
            return Ok(vec![]);
        }
        let triples = self.take_triples(pairs.len()).await?;
        let mut masked = Vec::with_capacity(2 * pairs.len());
        for ((x, y), t) in pairs.iter().zip(&triples) {
            masked.push(SecretInt::new(x.share - t.a, x.leader));
            masked.push(SecretInt::new(y.share - t.b, y.leader));
        }
        let opened = self.open_fp(&masked).await?;
        let leader = self.is_leader();
        Ok(triples
            .iter()
            .zip(opened.chunks_exact(2))
            .map(|(t, ef)| {
                let (e, f) = (ef[0], ef[1]);
                SecretInt::new(t.c + e * t.b + f * t.a, leader).add_public(e * f)
            })
            .collect())
    }

    /// Multiplies two secret values.
    pub async fn mul(&mut self, a: SecretInt, b: SecretInt) -> Result<SecretInt, Error> {
        let mut product = self.mul_many(&[(a, b)]).await?;
        product.pop().ok_or(Error::EmptyVector)
    }

    /// Computes `[c < r]` for public `c` and a bitwise shared `r`, scanning from the most
    /// significant bit for the first position where the two differ.
    async fn bitwise_lt_many(
        &mut self,
        publics: &[u64],
        bits: &[Vec<SecretInt>],
    ) -> Result<Vec<SecretInt>, Error> {
        let n = publics.len();
        let mut found = vec![self.constant(0); n];
        let mut lt = vec![self.constant(0); n];
        for i in (0..self.bit_length as usize).rev() {
            let pairs: Vec<(SecretInt, SecretInt)> = (0..n)
                .map(|j| {
                    let r_i = bits[j][i];
                    let differs = if (publics[j] >> i) & 1 == 1 {
                        1 - r_i
                    } else {
                        r_i
                    };
                    (differs, 1 - found[j])
                })
                .collect();
            let first_difference = self.mul_many(&pairs).await?;
            for (j, diff) in first_difference.into_iter().enumerate() {
                found[j] = found[j] + diff;
                if (publics[j] >> i) & 1 == 0 {
                    lt[j] = lt[j] + diff;
                }
            }
        }
        Ok(lt)
    }

    /// Computes `[x < 0]` for every `x` in `[-2^l, 2^l)`.
    ///
    /// Shifts `x` to `d = x + 2^l` in `[0, 2^(l+1))`, opens `d` masked by a random value whose `l`
    /// low bits are bitwise shared, and recovers the top bit of `d` from `d mod 2^l`.
    pub async fn ltz_many(&mut self, xs: &[SecretInt]) -> Result<Vec<SecretInt>, Error> {
        if xs.is_empty() {
            return Ok(vec![]);
        }
        let l = self.bit_length;
        let leader = self.is_leader();
        let masks = self.take_masks(xs.len()).await?;
        let bits: Vec<Vec<SecretInt>> = masks
            .iter()
            .map(|m| m.bits.iter().map(|&b| SecretInt::new(b, leader)).collect())
            .collect();
        let low: Vec<SecretInt> = bits
            .iter()
            .map(|bits| {
                bits.iter()
                    .enumerate()
                    .fold(self.constant(0), |acc, (i, b)| {
                        acc + b.scale(Fp::pow2(i as u32))
                    })
            })
            .collect();
        let shifted: Vec<SecretInt> = xs.iter().map(|x| x.add_public(Fp::pow2(l))).collect();
        let masked: Vec<SecretInt> = shifted
            .iter()
            .zip(&masks)
            .zip(&low)
            .map(|((d, m), r)| *d + *r + SecretInt::new(m.high, leader).scale(Fp::pow2(l)))
            .collect();
        let opened = self.open_fp(&masked).await?;
        let low_public: Vec<u64> = opened
            .iter()
            .map(|c| c.value() & ((1 << l) - 1))
            .collect();
        let wrapped = self.bitwise_lt_many(&low_public, &bits).await?;
        Ok(shifted
            .iter()
            .zip(&low_public)
            .zip(low.iter().zip(&wrapped))
            .map(|((d, &c), (r, u))| {
                let d_mod = u.scale(Fp::pow2(l)) - *r + c as i64;
                let top = (*d - d_mod).scale(Fp::inv_pow2(l));
                1 - top
            })
            .collect())
    }

    /// Computes `[a >= b]` for every pair.
    pub async fn ge_many(
        &mut self,
        pairs: &[(SecretInt, SecretInt)],
    ) -> Result<Vec<SecretInt>, Error> {
        let diffs: Vec<SecretInt> = pairs.iter().map(|(a, b)| *a - *b).collect();
        Ok(self
            .ltz_many(&diffs)
            .await?
            .into_iter()
            .map(|lt| 1 - lt)
            .collect())
    }

    /// Computes `[a >= b]`.
    pub async fn ge(&mut self, a: SecretInt, b: SecretInt) -> Result<SecretInt, Error> {
        let mut ge = self.ge_many(&[(a, b)]).await?;
        ge.pop().ok_or(Error::EmptyVector)
    }

    /// Computes `[a == b]` for every pair, as `1 - [a < b] - [b < a]`.
    pub async fn eq_many(
        &mut self,
        pairs: &[(SecretInt, SecretInt)],
    ) -> Result<Vec<SecretInt>, Error> {
        let diffs: Vec<SecretInt> = pairs.iter().flat_map(|(a, b)| [*a - *b, *b - *a]).collect();
        let lt = self.ltz_many(&diffs).await?;
        Ok(lt.chunks_exact(2).map(|lt| 1 - lt[0] - lt[1]).collect())
    }

    /// Computes `[a == b]`.
    pub async fn eq(&mut self, a: SecretInt, b: SecretInt) -> Result<SecretInt, Error> {
        let mut eq = self.eq_many(&[(a, b)]).await?;
        eq.pop().ok_or(Error::EmptyVector)
    }

    /// Obliviously selects `a` if `cond` is 1 and `b` if it is 0, for every `(cond, a, b)`.
    pub async fn select_many(
        &mut self,
        choices: &[(SecretInt, SecretInt, SecretInt)],
    ) -> Result<Vec<SecretInt>, Error> {
        let pairs: Vec<(SecretInt, SecretInt)> =
            choices.iter().map(|(c, a, b)| (*c, *a - *b)).collect();
        let products = self.mul_many(&pairs).await?;
        Ok(products
            .into_iter()
            .zip(choices)
            .map(|(p, (_, _, b))| p + *b)
            .collect())
    }

    /// Obliviously selects `a` if `cond` is 1 and `b` if it is 0.
    pub async fn select(
        &mut self,
        cond: SecretInt,
        a: SecretInt,
        b: SecretInt,
    ) -> Result<SecretInt, Error> {
        let mut selected = self.select_many(&[(cond, a, b)]).await?;
        selected.pop().ok_or(Error::EmptyVector)
    }

    /// The inner product of two vectors of the same length.
    pub async fn dot(&mut self, xs: &[SecretInt], ys: &[SecretInt]) -> Result<SecretInt, Error> {
        if xs.len() != ys.len() {
            return Err(Error::LengthMismatch {
                expected: xs.len(),
                actual: ys.len(),
            });
        }
        let pairs: Vec<(SecretInt, SecretInt)> = xs.iter().copied().zip(ys.iter().copied()).collect();
        let products = self.mul_many(&pairs).await?;
        Ok(products
            .into_iter()
            .fold(self.constant(0), |acc, p| acc + p))
    }

    /// The matrix product `a * b`, or `a * b^T` if `transpose_b` is set.
    pub async fn matrix_product(
        &mut self,
        a: &[Vec<SecretInt>],
        b: &[Vec<SecretInt>],
        transpose_b: bool,
    ) -> Result<Vec<Vec<SecretInt>>, Error> {
        let columns: Vec<Vec<SecretInt>> = if transpose_b {
            b.to_vec()
        } else {
            let width = b.first().map_or(0, Vec::len);
            if let Some(row) = b.iter().find(|row| row.len() != width) {
                return Err(Error::LengthMismatch {
                    expected: width,
                    actual: row.len(),
                });
            }
            (0..width)
                .map(|j| b.iter().map(|row| row[j]).collect())
                .collect()
        };
        let inner = a.first().or(columns.first()).map_or(0, Vec::len);
        for v in a.iter().chain(&columns) {
            if v.len() != inner {
                return Err(Error::LengthMismatch {
                    expected: inner,
                    actual: v.len(),
                });
            }
        }
        if inner == 0 {
            return Ok(vec![vec![self.constant(0); columns.len()]; a.len()]);
        }
        let mut pairs = Vec::with_capacity(a.len() * columns.len() * inner);
        for row in a {
            for column in &columns {
                pairs.extend(row.iter().copied().zip(column.iter().copied()));
            }
        }
        let products = self.mul_many(&pairs).await?;
        let entries: Vec<SecretInt> = products
            .chunks_exact(inner)
            .map(|chunk| chunk.iter().fold(self.constant(0), |acc, p| acc + *p))
            .collect();
        if columns.is_empty() {
            return Ok(vec![vec![]; a.len()]);
        }
        Ok(entries
            .chunks_exact(columns.len())
            .map(<[SecretInt]>::to_vec)
            .collect())
    }

    /// Returns the index and value of the minimum, the lowest index wins ties.
    pub async fn argmin(&mut self, xs: &[SecretInt]) -> Result<(SecretInt, SecretInt), Error> {
        let Some((first, rest)) = xs.split_first() else {
            return Err(Error::EmptyVector);
        };
        let mut min = *first;
        let mut index = self.constant(0);
        for (i, &x) in rest.iter().enumerate() {
            let smaller = self.ltz_many(&[x - min]).await?;
            let candidate = self.constant(i as i64 + 1);
            let updated = self
                .select_many(&[(smaller[0], x, min), (smaller[0], candidate, index)])
                .await?;
            min = updated[0];
            index = updated[1];
        }
        Ok((index, min))
    }

    /// Tells the dealer that this party will not request any more preprocessing.
    pub async fn finish(self) -> Result<(), Error> {
        send_to(&self.channel, self.dealer, "request (dealer)", &[Request::Done]).await?;
        debug!(
            "Party {} finished with {} unused triples and {} unused masks",
            self.party,
            self.triples.len(),
            self.masks.len()
        );
        Ok(())
    }
}

/// Simulates a shared computation of `parties` in-process, together with the dealer.
///
/// Every party runs `f` on its own [`Session`], all of them concurrently on the current task. The
/// results are returned in party order. Parties should call [`Session::finish`] once they are
/// done, the dealer is stopped as soon as all parties have returned in any case.
pub async fn simulate<T, E, F>(parties: usize, bit_length: u32, f: F) -> Result<Vec<T>, E>
where
    F: AsyncFn(Session<SimpleChannel>) -> Result<T, E>,
    E: From<Error>,
{
    let mut channels = SimpleChannel::channels(parties + 1);
    let Some(dealer_channel) = channels.pop() else {
        return Ok(vec![]);
    };
    let sessions = channels
        .into_iter()
        .enumerate()
        .map(|(p, channel)| Session::new(channel, p, parties, bit_length))
        .collect::<Result<Vec<_>, Error>>()?;
    let computation = pin!(try_join_all(sessions.into_iter().map(|s| f(s))));
    let preprocessing = pin!(dealer::dealer(&dealer_channel, parties));
    match select(preprocessing, computation).await {
        Either::Left((Ok(()), computation)) => computation.await,
        Either::Left((Err(e), _)) => Err(Error::from(e).into()),
        Either::Right((result, _)) => result,
    }
}

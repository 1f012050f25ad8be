//! Replacements for branching and indexing on secret values.
//!
//! Neither of these functions skips work depending on the data: every position of a vector is
//! always touched, so the cost and the communication pattern only depend on public lengths.

use crate::{
    channel::Channel,
    mpc::{Error, SecretInt, Session},
};

/// Boolean OR of two secret bits, computed as `1 - (1 - a) * (1 - b)`.
///
/// The result is guaranteed to be 0 or 1 if both inputs are, unlike `a + b - a * b` based
/// variants that only work for reduced inputs.
pub async fn secure_or(
    session: &mut Session<impl Channel>,
    a: SecretInt,
    b: SecretInt,
) -> Result<SecretInt, Error> {
    Ok(1 - session.mul(1 - a, 1 - b).await?)
}

/// Element-wise [`secure_or`] for many pairs of bits, in a single round of communication.
pub async fn secure_or_many(
    session: &mut Session<impl Channel>,
    pairs: &[(SecretInt, SecretInt)],
) -> Result<Vec<SecretInt>, Error> {
    let negated: Vec<(SecretInt, SecretInt)> =
        pairs.iter().map(|(a, b)| (1 - *a, 1 - *b)).collect();
    Ok(session
        .mul_many(&negated)
        .await?
        .into_iter()
        .map(|nor| 1 - nor)
        .collect())
}

/// A one-hot vector of the given length with a 1 at the secret `index`.
///
/// If `index` is outside of `0..len` the result is all zero.
pub async fn indicator_vector(
    session: &mut Session<impl Channel>,
    len: usize,
    index: SecretInt,
) -> Result<Vec<SecretInt>, Error> {
    let pairs: Vec<(SecretInt, SecretInt)> = (0..len)
        .map(|j| (session.constant(j as i64), index))
        .collect();
    session.eq_many(&pairs).await
}

/// Keeps only the first non-zero entry of a vector of secret bits, every other entry becomes 0.
///
/// The result is all zero if the input is. Costs one round of communication per entry.
pub async fn first_nonzero_mask(
    session: &mut Session<impl Channel>,
    bits: &[SecretInt],
) -> Result<Vec<SecretInt>, Error> {
    let mut found = session.constant(0);
    let mut mask = Vec::with_capacity(bits.len());
    for &bit in bits {
        // bit * (1 - found) and the negated OR (1 - found) * (1 - bit) only depend on the inputs
        let products = session
            .mul_many(&[(bit, 1 - found), (1 - found, 1 - bit)])
            .await?;
        let [keep, neither] = products[..] else {
            return Err(Error::LengthMismatch {
                expected: 2,
                actual: products.len(),
            });
        };
        mask.push(keep);
        found = 1 - neither;
    }
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{channel::SimpleChannel, mpc::simulate};

    #[tokio::test]
    async fn or_truth_table() -> Result<(), Error> {
        let results = simulate(2, 4, async |mut s: Session<SimpleChannel>| {
            let bits: Vec<(i64, i64)> = vec![(0, 0), (0, 1), (1, 0), (1, 1)];
            let mut single = vec![];
            for &(a, b) in &bits {
                let (a, b) = (s.constant(a), s.constant(b));
                single.push(secure_or(&mut s, a, b).await?);
            }
            let pairs: Vec<_> = bits.iter().map(|&(a, b)| (s.constant(a), s.constant(b))).collect();
            let batched = secure_or_many(&mut s, &pairs).await?;
            let opened = (s.open_many(&single).await?, s.open_many(&batched).await?);
            s.finish().await?;
            Ok::<_, Error>(opened)
        })
        .await?;
        for (single, batched) in results {
            assert_eq!(single, vec![0, 1, 1, 1]);
            assert_eq!(batched, vec![0, 1, 1, 1]);
        }
        Ok(())
    }

    #[tokio::test]
    async fn indicator_vector_of_secret_index() -> Result<(), Error> {
        let results = simulate(3, 5, async |mut s: Session<SimpleChannel>| {
            let index = s.input(1, (s.party() == 1).then_some(3)).await?;
            let one_hot = indicator_vector(&mut s, 6, index).await?;
            let outside = s.constant(9);
            let none = indicator_vector(&mut s, 6, outside).await?;
            let opened = (s.open_many(&one_hot).await?, s.open_many(&none).await?);
            s.finish().await?;
            Ok::<_, Error>(opened)
        })
        .await?;
        for (one_hot, none) in results {
            assert_eq!(one_hot, vec![0, 0, 0, 1, 0, 0]);
            assert_eq!(none, vec![0; 6]);
        }
        Ok(())
    }

    #[tokio::test]
    async fn first_nonzero_of_bits() -> Result<(), Error> {
        let results = simulate(2, 4, async |mut s: Session<SimpleChannel>| {
            let mut opened = vec![];
            for bits in [vec![0, 1, 0, 1, 1], vec![1, 1], vec![0, 0, 0], vec![]] {
                let shared: Vec<_> = bits.into_iter().map(|b| s.constant(b)).collect();
                let mask = first_nonzero_mask(&mut s, &shared).await?;
                opened.push(s.open_many(&mask).await?);
            }
            s.finish().await?;
            Ok::<_, Error>(opened)
        })
        .await?;
        for opened in results {
            assert_eq!(
                opened,
                vec![vec![0, 1, 0, 0, 0], vec![1, 0], vec![0, 0, 0], vec![]]
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn first_nonzero_takes_one_round_per_entry() -> Result<(), Error> {
        let results = simulate(2, 4, async |mut s: Session<SimpleChannel>| {
            let one = s.constant(1);
            s.mul(one, one).await?;
            let mut rounds = vec![];
            for len in [4, 8] {
                let bits = vec![s.constant(0); len];
                let before = s.channel().messages_sent();
                first_nonzero_mask(&mut s, &bits).await?;
                rounds.push(s.channel().messages_sent() - before);
            }
            s.finish().await?;
            Ok::<_, Error>(rounds)
        })
        .await?;
        for rounds in results {
            assert_eq!(rounds, vec![4, 8]);
        }
        Ok(())
    }
}

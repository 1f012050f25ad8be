//! Data types shared by the dealer and the computing parties.

use std::{
    fmt,
    ops::{Add, Mul, Neg, Sub},
};

use rand::Rng;
use serde::{Deserialize, Serialize};

/// The Mersenne prime `2^61 - 1`, the modulus of all shared arithmetic.
pub(crate) const MODULUS: u64 = (1 << 61) - 1;

/// An element of the prime field `GF(2^61 - 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub(crate) struct Fp(u64);

impl Fp {
    pub(crate) const ZERO: Fp = Fp(0);
    pub(crate) const ONE: Fp = Fp(1);

    /// Reduces an arbitrary `u64` into the field.
    pub(crate) fn new(v: u64) -> Self {
        let v = (v & MODULUS) + (v >> 61);
        Fp(if v >= MODULUS { v - MODULUS } else { v })
    }

    /// Embeds a signed integer, negative values are mapped to `p - |v|`.
    pub(crate) fn from_i64(v: i64) -> Self {
        let abs = Fp::new(v.unsigned_abs());
        if v < 0 { -abs } else { abs }
    }

    /// Interprets the element as a signed integer in `(-p/2, p/2]`.
    pub(crate) fn to_i64(self) -> i64 {
        if self.0 > MODULUS / 2 {
            -((MODULUS - self.0) as i64)
        } else {
            self.0 as i64
        }
    }

    /// The canonical representative in `0..p`.
    pub(crate) fn value(self) -> u64 {
        self.0
    }

    /// `2^k` for `k < 61`.
    pub(crate) fn pow2(k: u32) -> Self {
        debug_assert!(k < 61);
        Fp(1 << k)
    }

    /// The multiplicative inverse of `2^k` for `k <= 61`, which is `2^(61 - k)` since `2^61 = 1`.
    pub(crate) fn inv_pow2(k: u32) -> Self {
        debug_assert!(k <= 61);
        Fp::new(1 << (61 - k))
    }

    /// Samples a uniformly random field element.
    pub(crate) fn random(rng: &mut impl Rng) -> Self {
        Fp(rng.random_range(0..MODULUS))
    }
}

impl Add for Fp {
    type Output = Fp;

    fn add(self, rhs: Fp) -> Fp {
        let s = self.0 + rhs.0;
        Fp(if s >= MODULUS { s - MODULUS } else { s })
    }
}

impl Sub for Fp {
    type Output = Fp;

    fn sub(self, rhs: Fp) -> Fp {
        if self.0 >= rhs.0 {
            Fp(self.0 - rhs.0)
        } else {
            Fp(self.0 + MODULUS - rhs.0)
        }
    }
}

impl Neg for Fp {
    type Output = Fp;

    fn neg(self) -> Fp {
        if self.0 == 0 { self } else { Fp(MODULUS - self.0) }
    }
}

impl Mul for Fp {
    type Output = Fp;

    fn mul(self, rhs: Fp) -> Fp {
        let x = self.0 as u128 * rhs.0 as u128;
        let lo = (x as u64) & MODULUS;
        let hi = (x >> 61) as u64;
        Fp::new(lo + hi)
    }
}

/// Splits a value into `parties` uniformly random additive shares.
pub(crate) fn share_value(value: Fp, parties: usize, rng: &mut impl Rng) -> Vec<Fp> {
    let mut shares = Vec::with_capacity(parties);
    let mut sum = Fp::ZERO;
    for _ in 1..parties {
        let r = Fp::random(rng);
        sum = sum + r;
        shares.push(r);
    }
    shares.push(value - sum);
    shares
}

/// One party's additive share of a secret integer.
///
/// A `SecretInt` deliberately implements neither `PartialEq` nor `PartialOrd` and exposes no
/// accessor for its share, so the only way to learn anything about the underlying value is an
/// explicit reveal through a [`Session`](crate::mpc::Session).
///
/// Additions, subtractions and multiplications by public constants are local operations. Public
/// constants are added by party 0 only, which every share remembers in `leader`.
#[derive(Clone, Copy)]
pub struct SecretInt {
    pub(crate) share: Fp,
    pub(crate) leader: bool,
}

impl fmt::Debug for SecretInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretInt(..)")
    }
}

impl SecretInt {
    pub(crate) fn new(share: Fp, leader: bool) -> Self {
        Self { share, leader }
    }

    /// Adds a public field element (only the leader changes its share).
    pub(crate) fn add_public(self, c: Fp) -> Self {
        if self.leader {
            Self::new(self.share + c, true)
        } else {
            self
        }
    }

    /// Multiplies by a public field element.
    pub(crate) fn scale(self, c: Fp) -> Self {
        Self::new(self.share * c, self.leader)
    }
}

impl Add for SecretInt {
    type Output = SecretInt;

    fn add(self, rhs: SecretInt) -> SecretInt {
        SecretInt::new(self.share + rhs.share, self.leader)
    }
}

impl Sub for SecretInt {
    type Output = SecretInt;

    fn sub(self, rhs: SecretInt) -> SecretInt {
        SecretInt::new(self.share - rhs.share, self.leader)
    }
}

impl Neg for SecretInt {
    type Output = SecretInt;

    fn neg(self) -> SecretInt {
        SecretInt::new(-self.share, self.leader)
    }
}

impl Add<i64> for SecretInt {
    type Output = SecretInt;

    fn add(self, rhs: i64) -> SecretInt {
        self.add_public(Fp::from_i64(rhs))
    }
}

impl Sub<i64> for SecretInt {
    type Output = SecretInt;

    fn sub(self, rhs: i64) -> SecretInt {
        self.add_public(-Fp::from_i64(rhs))
    }
}

impl Mul<i64> for SecretInt {
    type Output = SecretInt;

    fn mul(self, rhs: i64) -> SecretInt {
        self.scale(Fp::from_i64(rhs))
    }
}

impl Add<SecretInt> for i64 {
    type Output = SecretInt;

    fn add(self, rhs: SecretInt) -> SecretInt {
        rhs + self
    }
}

impl Sub<SecretInt> for i64 {
    type Output = SecretInt;

    fn sub(self, rhs: SecretInt) -> SecretInt {
        (-rhs) + self
    }
}

impl Mul<SecretInt> for i64 {
    type Output = SecretInt;

    fn mul(self, rhs: SecretInt) -> SecretInt {
        rhs * self
    }
}

/// A party's share of a Beaver triple `(a, b, c)` with `c = a * b`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(crate) struct Triple {
    pub(crate) a: Fp,
    pub(crate) b: Fp,
    pub(crate) c: Fp,
}

/// A party's share of a random comparison mask.
///
/// `bits` are shares of the random bits `r_0..r_m` of the low mask `r' = sum(2^i * r_i)`, `high`
/// is a share of a random `r''` in `0..2^(STATISTICAL_SECURITY + 1)` that statistically hides the
/// upper part of the masked value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ComparisonMask {
    pub(crate) bits: Vec<Fp>,
    pub(crate) high: Fp,
}

//! Shamir secret sharing over GF(2^8), applied byte by byte.
//!
//! A share is laid out as `[threshold, x, f_0(x), f_1(x), ...]` where `f_j` is the
//! random polynomial whose constant term is byte `j` of the secret.

use rand::{CryptoRng, Rng};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareError {
    #[error("threshold must be between 2 and the share count (max 255)")]
    InvalidThreshold,
    #[error("share is too short to carry a header")]
    Truncated,
    #[error("share index 0 is reserved for the secret")]
    InvalidIndex,
    #[error("need {required} shares, got {provided}")]
    InsufficientShares { required: u8, provided: usize },
    #[error("shares disagree on threshold")]
    ThresholdMismatch,
    #[error("shares differ in length")]
    LengthMismatch,
    #[error("duplicate share index {0}")]
    DuplicateIndex(u8),
}

/// Multiplication in GF(2^8) modulo x^8 + x^4 + x^3 + x + 1. Branch-free.
fn gf_mul(mut a: u8, mut b: u8) -> u8 {
    let mut product = 0u8;
    for _ in 0..8 {
        product ^= a & 0u8.wrapping_sub(b & 1);
        let carry = 0u8.wrapping_sub(a >> 7);
        a = (a << 1) ^ (0x1b & carry);
        b >>= 1;
    }
    product
}

/// a^254 = a^-1 for a != 0; maps 0 to 0.
fn gf_inv(a: u8) -> u8 {
    let mut result = 1u8;
    let mut base = a;
    let mut exp = 254u8;
    while exp > 0 {
        if exp & 1 == 1 {
            result = gf_mul(result, base);
        }
        base = gf_mul(base, base);
        exp >>= 1;
    }
    result
}

/// Horner evaluation, coefficients lowest degree first.
fn eval(coefficients: &[u8], x: u8) -> u8 {
    coefficients
        .iter()
        .rev()
        .fold(0u8, |acc, &c| gf_mul(acc, x) ^ c)
}

/// Splits `secret` into `count` shares, any `threshold` of which recover it.
pub fn split<R: Rng + CryptoRng>(
    secret: &[u8],
    threshold: u8,
    count: u8,
    rng: &mut R,
) -> Result<Vec<Vec<u8>>, ShareError> {
    if threshold < 2 || threshold > count {
        return Err(ShareError::InvalidThreshold);
    }

    let mut shares: Vec<Vec<u8>> = (1..=count)
        .map(|x| {
            let mut share = Vec::with_capacity(secret.len() + 2);
            share.push(threshold);
            share.push(x);
            share
        })
        .collect();

    let mut coefficients = vec![0u8; threshold as usize];
    for &byte in secret {
        coefficients[0] = byte;
        rng.fill(&mut coefficients[1..]);
        for share in shares.iter_mut() {
            let x = share[1];
            share.push(eval(&coefficients, x));
        }
    }
    coefficients.fill(0);

    Ok(shares)
}

/// Lagrange interpolation at zero over the first `threshold` shares.
pub fn combine<S: AsRef<[u8]>>(shares: &[S]) -> Result<Vec<u8>, ShareError> {
    let first = shares
        .first()
        .ok_or(ShareError::InsufficientShares {
            required: 2,
            provided: 0,
        })?
        .as_ref();
    if first.len() < 2 {
        return Err(ShareError::Truncated);
    }
    let threshold = first[0];
    if threshold < 2 {
        return Err(ShareError::InvalidThreshold);
    }
    if shares.len() < threshold as usize {
        return Err(ShareError::InsufficientShares {
            required: threshold,
            provided: shares.len(),
        });
    }

    let mut xs = Vec::with_capacity(shares.len());
    for share in shares {
        let share = share.as_ref();
        if share.len() < 2 {
            return Err(ShareError::Truncated);
        }
        if share[0] != threshold {
            return Err(ShareError::ThresholdMismatch);
        }
        if share.len() != first.len() {
            return Err(ShareError::LengthMismatch);
        }
        if share[1] == 0 {
            return Err(ShareError::InvalidIndex);
        }
        if xs.contains(&share[1]) {
            return Err(ShareError::DuplicateIndex(share[1]));
        }
        xs.push(share[1]);
    }

    let used = &shares[..threshold as usize];
    let xs = &xs[..threshold as usize];

    // l_i(0) = prod_{j != i} x_j / (x_j - x_i); subtraction is xor in GF(2^8)
    let basis: Vec<u8> = xs
        .iter()
        .enumerate()
        .map(|(i, &xi)| {
            let (num, den) = xs
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .fold((1u8, 1u8), |(num, den), (_, &xj)| {
                    (gf_mul(num, xj), gf_mul(den, xj ^ xi))
                });
            gf_mul(num, gf_inv(den))
        })
        .collect();

    let len = first.len() - 2;
    let mut secret = vec![0u8; len];
    for (share, &l) in used.iter().zip(&basis) {
        for (out, &y) in secret.iter_mut().zip(&share.as_ref()[2..]) {
            *out ^= gf_mul(y, l);
        }
    }
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_std::rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn field_inverse() {
        for a in 1..=255u8 {
            assert_eq!(gf_mul(a, gf_inv(a)), 1, "a = {a}");
        }
        assert_eq!(gf_mul(0x57, 0x83), 0xc1);
    }

    #[test]
    fn any_two_of_ten_recover() {
        let mut rng = StdRng::seed_from_u64(11);
        let secret = b"ciphertext bytes \x00\xff".to_vec();
        let shares = split(&secret, 2, 10, &mut rng).unwrap();
        assert_eq!(shares.len(), 10);

        for i in 0..10 {
            for j in 0..10 {
                if i != j {
                    let pair = [&shares[i], &shares[j]];
                    assert_eq!(combine(&pair).unwrap(), secret);
                }
            }
        }
    }

    #[test]
    fn higher_threshold() {
        let mut rng = StdRng::seed_from_u64(12);
        let secret = vec![7u8; 40];
        let shares = split(&secret, 3, 5, &mut rng).unwrap();

        assert_eq!(combine(&[&shares[4], &shares[0], &shares[2]]).unwrap(), secret);
        assert_eq!(
            combine(&[&shares[4], &shares[0]]),
            Err(ShareError::InsufficientShares {
                required: 3,
                provided: 2
            })
        );
    }

    #[test]
    fn single_share_is_insufficient() {
        let mut rng = StdRng::seed_from_u64(13);
        let shares = split(b"abc", 2, 10, &mut rng).unwrap();
        assert!(matches!(
            combine(&[&shares[3]]),
            Err(ShareError::InsufficientShares { .. })
        ));
    }

    #[test]
    fn inconsistent_shares_are_rejected() {
        let mut rng = StdRng::seed_from_u64(14);
        let a = split(b"abc", 2, 4, &mut rng).unwrap();
        let b = split(b"abcd", 2, 4, &mut rng).unwrap();

        assert_eq!(combine(&[&a[0], &b[1]]), Err(ShareError::LengthMismatch));
        assert_eq!(combine(&[&a[0], &a[0]]), Err(ShareError::DuplicateIndex(1)));

        let mut tampered = a[1].clone();
        tampered[0] = 3;
        assert_eq!(combine(&[&a[0], &tampered]), Err(ShareError::ThresholdMismatch));

        assert_eq!(combine(&[vec![2u8]]), Err(ShareError::Truncated));
    }

    #[test]
    fn invalid_parameters() {
        let mut rng = StdRng::seed_from_u64(15);
        assert_eq!(split(b"x", 1, 10, &mut rng), Err(ShareError::InvalidThreshold));
        assert_eq!(split(b"x", 5, 4, &mut rng), Err(ShareError::InvalidThreshold));
    }
}

//! Group and field helpers over BLS12-381.
//!
//! Everything here is pure apart from scalar sampling, which always draws from
//! a caller-supplied cryptographically secure RNG.

use ark_ec::{pairing::Pairing, PrimeGroup};
use ark_ff::{PrimeField, UniformRand, Zero};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use rand::{CryptoRng, Rng};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::types::{Curve, Gt, Scalar, G1, G2};

/// Uniformly random scalar in Fr.
pub fn random_scalar<R: Rng + CryptoRng>(rng: &mut R) -> Scalar {
    Scalar::rand(rng)
}

/// Uniformly random scalar in Fr \ {0}.
pub fn random_nonzero_scalar<R: Rng + CryptoRng>(rng: &mut R) -> Scalar {
    loop {
        let s = Scalar::rand(rng);
        if !s.is_zero() {
            return s;
        }
    }
}

/// Deterministic map from bytes to Fr: SHA-256, read big-endian, reduced mod r.
pub fn hash_to_scalar(bytes: &[u8]) -> Scalar {
    let digest = Sha256::digest(bytes);
    Scalar::from_be_bytes_mod_order(&digest)
}

pub fn pairing(p: G1, q: G2) -> Gt {
    Curve::pairing(p, q)
}

/// e(g1, g2) for the standard generators.
pub fn gt_generator() -> Gt {
    Gt::generator()
}

pub fn g1_generator() -> G1 {
    G1::generator()
}

pub fn g2_generator() -> G2 {
    G2::generator()
}

/// Compressed canonical bytes of any arkworks value, hex-encoded.
pub fn to_hex<T: CanonicalSerialize>(value: &T) -> String {
    let mut bytes = Vec::with_capacity(value.compressed_size());
    // writing into a Vec cannot fail
    let _ = value.serialize_compressed(&mut bytes);
    hex::encode(bytes)
}

/// Inverse of [`to_hex`]. Rejects bad hex, wrong lengths and points off the curve.
pub fn from_hex<T: CanonicalDeserialize>(encoded: &str) -> Result<T> {
    let bytes = hex::decode(encoded.trim())
        .map_err(|e| Error::MalformedEncoding(format!("invalid hex: {e}")))?;
    let mut reader = bytes.as_slice();
    let value = T::deserialize_compressed(&mut reader)
        .map_err(|e| Error::MalformedEncoding(e.to_string()))?;
    if !reader.is_empty() {
        return Err(Error::MalformedEncoding(format!(
            "{} trailing bytes after element",
            reader.len()
        )));
    }
    Ok(value)
}

//! Ciphertext-policy attribute-based searchable encryption.
//!
//! Encrypt(W, P):
//! ```text
//!   x      = policy vector over U, x_i random if U[i] in P else 0, x_last = -sum(x)
//!   ct*    = h^t
//!   ctw_j  = e(g1,g2)^(alpha t) * e(g1^H(w_j), g2^t)
//!   ct_i   = h_i^t * g1^(x_i)
//! ```
//! Trapdoor(W'):
//! ```text
//!   T*     = sk1^|W'| * sk2^(sum H(w'))
//!   T_i    = sk3 if y_i = 1 else sk3^0
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use ark_ff::Zero;
use rand::rngs::OsRng;
use rand::{CryptoRng, Rng};
use rayon::prelude::*;
use tracing::{debug, error, instrument};

use crate::error::{Error, Result};
use crate::group::{hash_to_scalar, pairing, random_nonzero_scalar, random_scalar};
use crate::handshake::{Connector, SearchKeyProtocol};
use crate::params::{ParameterSource, PublicParameterStore};
use crate::pre::PreEngine;
use crate::types::{
    AttributeVector, PolicyVector, PublicParameters, Scalar, SearchCiphertext, SecretKey, Trapdoor,
};
use crate::util::field_sum;

/// Builds the zero-sum policy vector for `policy` over the universe of `pp`.
///
/// Attributes that are not in the universe are ignored.
///
/// # Errors
/// [`Error::InternalInvariantViolation`] if the vector does not sum to zero; see
/// [`check_zero_sum`].
pub fn build_policy_vector<R: Rng + CryptoRng>(
    pp: &PublicParameters,
    policy: &HashSet<String>,
    rng: &mut R,
) -> Result<PolicyVector> {
    let mut x = Vec::with_capacity(pp.dimension() + 1);
    let mut sum = Scalar::zero();
    for attribute in &pp.universe {
        if policy.contains(attribute) {
            let x_i = random_nonzero_scalar(rng);
            sum += x_i;
            x.push(x_i);
        } else {
            x.push(Scalar::zero());
        }
    }
    x.push(-sum);
    check_zero_sum(&x)?;

    let ignored = policy.iter().filter(|a| pp.index_of(a).is_none()).count();
    if ignored > 0 {
        debug!(ignored, "policy attributes outside the universe were ignored");
    }
    Ok(PolicyVector(x))
}

/// Fails loudly when `x` does not sum to zero.
///
/// The sum is zero by construction, so a failure means the field arithmetic is
/// broken. Debug builds panic. Release builds log at `error` and return
/// [`Error::InternalInvariantViolation`], which callers must treat as fatal for
/// the process: no ciphertext is produced and the operation must not be retried.
pub fn check_zero_sum(x: &[Scalar]) -> Result<()> {
    if field_sum(x).is_zero() {
        return Ok(());
    }
    error!(len = x.len(), "policy vector does not sum to zero");
    if cfg!(debug_assertions) {
        panic!("policy vector does not sum to zero");
    }
    Err(Error::InternalInvariantViolation("policy vector does not sum to zero".into()))
}

/// Encrypt: produces the searchable ciphertext for `keywords` under `policy`.
#[instrument(
    level = "info",
    skip_all,
    fields(keywords = keywords.len(), attributes = pp.dimension())
)]
pub fn encrypt<R: Rng + CryptoRng>(
    pp: &PublicParameters,
    keywords: &[String],
    policy: &HashSet<String>,
    rng: &mut R,
) -> Result<SearchCiphertext> {
    let x = build_policy_vector(pp, policy, rng)?;
    let t = random_scalar(rng);
    Ok(encrypt_with(pp, keywords, &x, t))
}

/// Deterministic core of [`encrypt`] once x and t are fixed.
///
/// Each output slot depends only on pp, its own input and t, so both vectors
/// are built in parallel.
pub fn encrypt_with(
    pp: &PublicParameters,
    keywords: &[String],
    x: &PolicyVector,
    t: Scalar,
) -> SearchCiphertext {
    assert!(
        x.len() == pp.dimension() + 1,
        "policy vector must have length {}",
        pp.dimension() + 1
    );

    let ct_star = pp.h * t;
    let eggat = pp.eggalpha * t;
    let g2t = pp.g2 * t;

    let ctw = keywords
        .par_iter()
        .map(|w| eggat + pairing(pp.g1 * hash_to_scalar(w.as_bytes()), g2t))
        .collect();

    let ct = pp
        .h_i
        .par_iter()
        .zip(x.entries()[..pp.dimension()].par_iter())
        .map(|(h_i, &x_i)| *h_i * t + pp.g1 * x_i)
        .collect();

    SearchCiphertext { ct_star, ctw, ct }
}

/// Encrypts several documents under the same parameters in parallel.
pub fn encrypt_batch(
    pp: &PublicParameters,
    documents: &[(Vec<String>, HashSet<String>)],
) -> Result<Vec<SearchCiphertext>> {
    documents
        .par_iter()
        .map(|(keywords, policy)| encrypt(pp, keywords, policy, &mut OsRng))
        .collect()
}

/// Trapdoor: the search token for `keywords` under the user's key.
#[instrument(level = "info", skip_all, fields(keywords = keywords.len(), attributes = y.len()))]
pub fn trapdoor(sk: &SecretKey, y: &AttributeVector, keywords: &[String]) -> Trapdoor {
    let d_prime = keywords.len() as u64;
    let sum: Scalar = keywords.iter().map(|w| hash_to_scalar(w.as_bytes())).sum();

    let t0 = sk.sk2 * sum;
    let t_star = sk.sk1 * Scalar::from(d_prime) + t0;

    let t = y
        .bits()
        .iter()
        .map(|&bit| if bit { sk.sk3 } else { sk.sk3 * Scalar::zero() })
        .collect();

    Trapdoor {
        t_star,
        t,
        sky: sk.sky,
        d_prime,
    }
}

/// Ties encryption and trapdoor generation to the authority-backed caches.
pub struct AbseScheme<S, C, E> {
    params: PublicParameterStore<S>,
    keys: SearchKeyProtocol<C, E>,
}

impl<S, C, E> AbseScheme<S, C, E>
where
    S: ParameterSource,
    C: Connector,
    E: PreEngine,
{
    pub fn new(params: PublicParameterStore<S>, keys: SearchKeyProtocol<C, E>) -> Self {
        AbseScheme { params, keys }
    }

    pub async fn public_parameters(&self) -> Result<Arc<PublicParameters>> {
        self.params.fetch().await
    }

    /// Producer side: needs only the public parameters.
    pub async fn encrypt(
        &self,
        keywords: &[String],
        policy: &HashSet<String>,
    ) -> Result<SearchCiphertext> {
        let pp = self.params.fetch().await?;
        encrypt(&pp, keywords, policy, &mut OsRng)
    }

    /// Consumer side: needs the authenticated search key.
    pub async fn trapdoor(&self, keywords: &[String]) -> Result<Trapdoor> {
        let key = self.keys.get_key().await?;
        Ok(trapdoor(&key.sk, &key.y, keywords))
    }
}

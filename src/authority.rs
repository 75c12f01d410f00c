//! Local trusted authority: parameter setup and search-key issuance.
//!
//! Used by the demo binary and the test suites to stand in for the remote
//! authority. Production clients only ever see its output through `/pp` and the
//! key handshake.

use ark_ff::Field;
use rand::{CryptoRng, Rng};

use crate::group::{g1_generator, g2_generator, hash_to_scalar, pairing, random_nonzero_scalar};
use crate::params::PublicParametersWire;
use crate::types::{AttributeVector, PublicParameters, Scalar, SecretKey};
use crate::util::masked_sum;

/// Authority-side secrets behind a set of [`PublicParameters`].
#[derive(Clone, Debug)]
pub struct MasterSecret {
    pub alpha: Scalar,
    pub beta: Scalar,
    /// Discrete logs of `h_i` base `g1`
    pub r: Vec<Scalar>,
}

/// Setup: samples α, β and one exponent per attribute of `universe`.
///
/// # Returns
/// * `PublicParameters` - (g1, g2, e(g1,g2)^α, h = g1^β, h_i = g1^r_i, U)
/// * `MasterSecret` - (α, β, r)
pub fn setup<R: Rng + CryptoRng>(
    universe: &[String],
    rng: &mut R,
) -> (PublicParameters, MasterSecret) {
    let g1 = g1_generator();
    let g2 = g2_generator();

    let alpha = random_nonzero_scalar(rng);
    let beta = random_nonzero_scalar(rng);
    let r: Vec<Scalar> = universe.iter().map(|_| random_nonzero_scalar(rng)).collect();

    let pp = PublicParameters {
        g1,
        g2,
        eggalpha: pairing(g1, g2) * alpha,
        h: g1 * beta,
        h_i: r.iter().map(|&r_i| g1 * r_i).collect(),
        universe: universe.to_vec(),
    };

    (pp, MasterSecret { alpha, beta, r })
}

/// Issues a search key bound to the attribute vector `y`.
pub fn issue_key<R: Rng + CryptoRng>(
    msk: &MasterSecret,
    pp: &PublicParameters,
    y: &AttributeVector,
    rng: &mut R,
) -> SecretKey {
    assert_eq!(
        y.len(),
        pp.dimension(),
        "attribute vector must have dimension {}",
        pp.dimension()
    );

    let s = random_nonzero_scalar(rng);
    let binding = hash_to_scalar(&y.to_wire());
    // beta is sampled nonzero in setup
    let beta_inv = msk.beta.inverse().unwrap_or(Scalar::ONE);
    let r_y = masked_sum(&msk.r, y.bits());

    SecretKey {
        sk1: pp.g2 * (msk.alpha + s),
        sk2: pp.g2 * s,
        sk3: pp.g2 * (s * beta_inv),
        sky: pp.g2 * (binding * s + r_y),
    }
}

/// JSON body the authority serves at `GET /pp`.
pub fn encode_public_parameters(pp: &PublicParameters) -> PublicParametersWire {
    PublicParametersWire::encode(pp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ec::PrimeGroup;
    use ark_ff::Zero;
    use ark_std::rand::SeedableRng;
    use rand::rngs::StdRng;

    fn universe() -> Vec<String> {
        ["age", "dept", "role"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn setup_shapes_match_universe() {
        let mut rng = StdRng::seed_from_u64(42);
        let (pp, msk) = setup(&universe(), &mut rng);

        assert_eq!(pp.h_i.len(), 3);
        assert_eq!(msk.r.len(), 3);
        assert_eq!(pp.index_of("role"), Some(2));
        assert_eq!(pp.eggalpha, pairing(pp.g1, pp.g2) * msk.alpha);
        assert_eq!(pp.h_i[1], pp.g1 * msk.r[1]);
        assert!(!pp.h.is_zero());
    }

    #[test]
    fn issued_keys_are_fresh_per_call() {
        let mut rng = StdRng::seed_from_u64(43);
        let (pp, msk) = setup(&universe(), &mut rng);
        let y = AttributeVector::new(vec![true, false, true]);

        let a = issue_key(&msk, &pp, &y, &mut rng);
        let b = issue_key(&msk, &pp, &y, &mut rng);
        assert_ne!(a, b);
        assert_eq!(a.sk2 * msk.beta.inverse().unwrap(), a.sk3);
        assert_eq!(pp.g2, crate::types::G2::generator());
    }

    #[test]
    #[should_panic(expected = "attribute vector must have dimension")]
    fn issue_key_wrong_dimension() {
        let mut rng = StdRng::seed_from_u64(44);
        let (pp, msk) = setup(&universe(), &mut rng);
        issue_key(&msk, &pp, &AttributeVector::new(vec![true]), &mut rng);
    }
}

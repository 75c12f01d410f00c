use ark_bls12_381::{Bls12_381, Fr, G1Projective, G2Projective};
use ark_ec::pairing::{Pairing, PairingOutput};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};

pub type Curve = Bls12_381;
pub type Scalar = Fr;
pub type G1 = G1Projective;
pub type G2 = G2Projective;
/// Target group, written additively: `a + b` multiplies in GT and `a * s` raises to `s`.
pub type Gt = PairingOutput<Curve>;
pub type TargetField = <Curve as Pairing>::TargetField;

/// Public parameters published by the trusted authority.
///
/// `universe` fixes the index of every attribute; `h_i[i]` belongs to `universe[i]`.
#[derive(Clone, Debug, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct PublicParameters {
    pub g1: G1,
    pub g2: G2,
    pub eggalpha: Gt,
    pub h: G1,
    pub h_i: Vec<G1>,
    pub universe: Vec<String>,
}

impl PublicParameters {
    /// Number of attributes in the universe.
    pub fn dimension(&self) -> usize {
        self.universe.len()
    }

    /// Position of `attribute` in the universe, if present.
    pub fn index_of(&self, attribute: &str) -> Option<usize> {
        self.universe.iter().position(|a| a == attribute)
    }
}

/// Policy vector x of length |U|+1 whose entries sum to zero.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyVector(pub Vec<Scalar>);

impl PolicyVector {
    pub fn entries(&self) -> &[Scalar] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Searchable ciphertext attached to an uploaded document
#[derive(Clone, Debug, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct SearchCiphertext {
    /// h^t
    pub ct_star: G1,
    /// One blinded GT element per keyword
    pub ctw: Vec<Gt>,
    /// h_i^t + g1^x_i for every attribute of the universe
    pub ct: Vec<G1>,
}

/// Per-user search key issued by the trusted authority.
#[derive(Clone, Debug, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct SecretKey {
    pub sk1: G2,
    pub sk2: G2,
    pub sk3: G2,
    pub sky: G2,
}

/// Attribute bits covered by a [`SecretKey`], one per universe entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AttributeVector(Vec<bool>);

impl AttributeVector {
    pub fn new(bits: Vec<bool>) -> Self {
        AttributeVector(bits)
    }

    pub fn bits(&self) -> &[bool] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Wire form used by the authority: one `0`/`1` integer per attribute.
    pub fn to_wire(&self) -> Vec<u8> {
        self.0.iter().map(|&b| b as u8).collect()
    }
}

/// Key material delivered by a successful handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchKey {
    pub sk: SecretKey,
    pub y: AttributeVector,
}

/// Search token for one query.
#[derive(Clone, Debug, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct Trapdoor {
    pub t_star: G2,
    /// Same length as the attribute vector: `sk3` where y is set, identity elsewhere
    pub t: Vec<G2>,
    pub sky: G2,
    pub d_prime: u64,
}

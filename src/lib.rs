//! Attribute-based searchable encryption (ABSE) and secret-sharing account recovery.
//!
//! This crate is the cryptographic core of a secure file-sharing client. It uses the
//! Arkworks ecosystem with the BLS12-381 pairing-friendly curve.
//!
//! Searchable encryption:
//! - [`params`]: fetches and memoizes the trusted authority's public parameters
//! - [`handshake`]: challenge-response state machine that obtains the user's search key
//! - [`abse`]: `encrypt` under an access policy and `trapdoor` for keyword queries
//!
//! Account recovery:
//! - [`recovery`]: AES-256-CBC under a passphrase-derived key, then Shamir 2-of-10
//! - [`account`]: backup/recover through an email-gated share escrow
//! - [`pre`]: key management around the external proxy re-encryption engine
//!
//! Design choices:
//! - Scalars are always sampled from a caller-supplied CSPRNG (`OsRng` in the async APIs)
//! - Caches are explicit objects owned by the application, single-flight on first use
//! - Not constant-time across all code paths; do not use for production without a security review

pub mod abse;
pub mod account;
pub mod authority;
pub mod config;
pub mod error;
pub mod group;
pub mod handshake;
pub mod params;
pub mod pre;
pub mod recovery;
pub mod shamir;
pub mod transport;
pub mod types;
pub mod util;

pub use abse::{encrypt, encrypt_batch, trapdoor, AbseScheme};
pub use config::Config;
pub use error::{Error, Result};
pub use handshake::{run_handshake, SearchKeyProtocol};
pub use params::{HttpParameterSource, PublicParameterStore};
pub use recovery::{recombine, split, SecretBundle, Share};
pub use types::{
    AttributeVector, PolicyVector, PublicParameters, SearchCiphertext, SearchKey, SecretKey,
    Trapdoor,
};

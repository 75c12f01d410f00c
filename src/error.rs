use thiserror::Error;

/// Errors surfaced by the search-encryption and recovery protocols.
#[derive(Error, Debug)]
pub enum Error {
    /// A group element or key string could not be decoded.
    #[error("malformed encoding: {0}")]
    MalformedEncoding(String),

    #[error("trusted authority unreachable: {0}")]
    UnreachableAuthority(String),

    /// The authority answered, but not with valid public parameters.
    #[error("malformed authority response: {0}")]
    MalformedResponse(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Email verification at the share escrow was rejected.
    #[error("verification failed: {0}")]
    VerificationFailed(String),

    #[error("could not recover secrets")]
    ReconstructionFailed,

    /// A property that holds by construction did not. Always a bug.
    #[error("internal invariant violated: {0}")]
    InternalInvariantViolation(String),

    #[error("proxy re-encryption engine: {0}")]
    Engine(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

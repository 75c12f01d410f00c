//! Account backup and recovery through an email-gated share escrow.
//!
//! The two failure points stay distinct: a rejected email code is
//! [`Error::VerificationFailed`], anything after that is
//! [`Error::ReconstructionFailed`] with no hint about which factor was wrong.

use std::future::Future;

use rand::rngs::OsRng;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::handshake::{Connector, SearchKeyProtocol};
use crate::pre::PreEngine;
use crate::recovery::{self, SecretBundle, Share};

/// Remote store holding base64 shares behind email verification.
pub trait ShareEscrow: Send + Sync {
    fn deposit(&self, email: &str, shares: Vec<String>)
        -> impl Future<Output = Result<()>> + Send;

    /// Asks the escrow to email a verification code.
    fn request_code(&self, email: &str) -> impl Future<Output = Result<()>> + Send;

    /// Exchanges a verification code for the stored shares.
    fn redeem(&self, email: &str, code: &str) -> impl Future<Output = Result<Vec<String>>> + Send;
}

pub struct RecoveryFlow<S> {
    escrow: S,
    threshold: u8,
    count: u8,
}

impl<S: ShareEscrow> RecoveryFlow<S> {
    pub fn new(escrow: S) -> Self {
        RecoveryFlow {
            escrow,
            threshold: recovery::SHARE_THRESHOLD,
            count: recovery::SHARE_COUNT,
        }
    }

    pub fn with_config(escrow: S, config: &Config) -> Self {
        RecoveryFlow {
            escrow,
            threshold: config.share_threshold,
            count: config.share_count,
        }
    }

    /// Splits `bundle` under `passphrase` and deposits the shares.
    #[instrument(level = "info", skip_all)]
    pub async fn backup(&self, email: &str, passphrase: &str, bundle: &SecretBundle) -> Result<()> {
        let payload = bundle.to_json()?;
        let secret = passphrase.as_bytes();
        let shares =
            recovery::split_with(secret, &payload, self.threshold, self.count, &mut OsRng)?;
        let encoded = shares.iter().map(Share::to_base64).collect();
        self.escrow.deposit(email, encoded).await?;
        info!(count = self.count, "backup shares deposited");
        Ok(())
    }

    /// First step of recovery: have the escrow send a code.
    pub async fn start(&self, email: &str) -> Result<()> {
        self.escrow
            .request_code(email)
            .await
            .map_err(|e| Error::VerificationFailed(e.to_string()))
    }

    /// Redeems `code` and rebuilds the bundle with `passphrase`.
    #[instrument(level = "info", skip_all)]
    pub async fn recover(&self, email: &str, code: &str, passphrase: &str) -> Result<SecretBundle> {
        let encoded = self.escrow.redeem(email, code).await.map_err(|e| {
            warn!(error = %e, "escrow rejected verification code");
            match e {
                Error::VerificationFailed(_) => e,
                other => Error::VerificationFailed(other.to_string()),
            }
        })?;
        if encoded.is_empty() {
            return Err(Error::VerificationFailed("no shares on record".into()));
        }

        let shares: Vec<Share> = encoded
            .iter()
            .map(|s| Share::from_base64(s))
            .collect::<Result<_>>()
            .map_err(|_| Error::ReconstructionFailed)?;

        let payload = recovery::recombine(passphrase.as_bytes(), &shares).ok_or_else(|| {
            warn!("share reconstruction failed");
            Error::ReconstructionFailed
        })?;
        let bundle = SecretBundle::from_json(&payload).map_err(|_| Error::ReconstructionFailed)?;
        info!("secrets recovered");
        Ok(bundle)
    }

    /// Recovers the bundle, installs its proxy re-encryption keys in the key
    /// manager behind `session` and drops the cached search key, so the next
    /// [`SearchKeyProtocol::get_key`] logs in under the recovered identity.
    /// Returns the wallet key.
    ///
    /// Nothing changes on failure.
    #[instrument(level = "info", skip_all)]
    pub async fn restore_into<C, E>(
        &self,
        email: &str,
        code: &str,
        passphrase: &str,
        session: &SearchKeyProtocol<C, E>,
    ) -> Result<String>
    where
        C: Connector,
        E: PreEngine,
    {
        let bundle = self.recover(email, code, passphrase).await?;
        session
            .keys()
            .restore(bundle.pre_keys)
            .map_err(|_| Error::ReconstructionFailed)?;
        session.reset();
        info!("recovered keys installed, next search key request logs in again");
        Ok(bundle.wallet_private_key)
    }
}

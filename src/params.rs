//! Fetching and caching the authority's public parameters.
//!
//! The first successful fetch is kept for the life of the store. Concurrent
//! callers during a cache miss wait on the same in-flight request; a failed
//! fetch leaves the cache empty so the next call goes back to the network.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::group::{from_hex, to_hex};
use crate::types::PublicParameters;

/// JSON body served at `GET /pp`. Group elements are hex-encoded compressed points.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicParametersWire {
    pub g1: String,
    pub g2: String,
    pub eggalpha: String,
    pub h: String,
    pub h_i: Vec<String>,
    #[serde(rename = "U")]
    pub universe: Vec<String>,
}

impl PublicParametersWire {
    pub fn encode(pp: &PublicParameters) -> Self {
        PublicParametersWire {
            g1: to_hex(&pp.g1),
            g2: to_hex(&pp.g2),
            eggalpha: to_hex(&pp.eggalpha),
            h: to_hex(&pp.h),
            h_i: pp.h_i.iter().map(to_hex).collect(),
            universe: pp.universe.clone(),
        }
    }

    pub fn decode(&self) -> Result<PublicParameters> {
        if self.h_i.len() != self.universe.len() {
            return Err(Error::MalformedResponse(format!(
                "{} h_i elements for a universe of {} attributes",
                self.h_i.len(),
                self.universe.len()
            )));
        }
        let field = |name: &str, e: Error| Error::MalformedResponse(format!("{name}: {e}"));
        Ok(PublicParameters {
            g1: from_hex(&self.g1).map_err(|e| field("g1", e))?,
            g2: from_hex(&self.g2).map_err(|e| field("g2", e))?,
            eggalpha: from_hex(&self.eggalpha).map_err(|e| field("eggalpha", e))?,
            h: from_hex(&self.h).map_err(|e| field("h", e))?,
            h_i: self
                .h_i
                .iter()
                .enumerate()
                .map(|(i, s)| from_hex(s).map_err(|e| field(&format!("h_i[{i}]"), e)))
                .collect::<Result<Vec<_>>>()?,
            universe: self.universe.clone(),
        })
    }
}

/// Where public parameters come from.
pub trait ParameterSource: Send + Sync {
    fn fetch_wire(&self) -> impl Future<Output = Result<PublicParametersWire>> + Send;
}

/// `GET {authority_url}/pp` over HTTPS.
#[derive(Clone, Debug)]
pub struct HttpParameterSource {
    client: reqwest::Client,
    url: String,
}

impl HttpParameterSource {
    /// Refuses anything but `https://`, including on redirects.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        if !url.starts_with("https://") {
            return Err(Error::Config(format!("{url} is not an https URL")));
        }
        let client = reqwest::Client::builder()
            .https_only(true)
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(Self::with_client(client, url))
    }

    /// Uses `client` as given, with no scheme restriction.
    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        HttpParameterSource {
            client,
            url: url.into(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.parameters_url())
    }
}

impl ParameterSource for HttpParameterSource {
    async fn fetch_wire(&self) -> Result<PublicParametersWire> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::UnreachableAuthority(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::UnreachableAuthority(format!(
                "{} answered {status}",
                self.url
            )));
        }

        response
            .json::<PublicParametersWire>()
            .await
            .map_err(|e| Error::MalformedResponse(e.to_string()))
    }
}

/// Memoizing front for a [`ParameterSource`].
pub struct PublicParameterStore<S> {
    source: S,
    cache: OnceCell<Arc<PublicParameters>>,
}

impl<S: ParameterSource> PublicParameterStore<S> {
    pub fn new(source: S) -> Self {
        PublicParameterStore {
            source,
            cache: OnceCell::new(),
        }
    }

    /// Returns the cached parameters, fetching them once on first use.
    #[instrument(level = "debug", skip_all)]
    pub async fn fetch(&self) -> Result<Arc<PublicParameters>> {
        if let Some(pp) = self.cache.get() {
            debug!("public parameters served from cache");
            return Ok(Arc::clone(pp));
        }
        let pp = self
            .cache
            .get_or_try_init(|| async {
                debug!("fetching public parameters");
                let wire = self.source.fetch_wire().await.inspect_err(|e| {
                    warn!(error = %e, "public parameter fetch failed");
                })?;
                let pp = wire.decode()?;
                debug!(attributes = pp.dimension(), "public parameters cached");
                Ok::<_, Error>(Arc::new(pp))
            })
            .await?;
        Ok(Arc::clone(pp))
    }

    pub fn cached(&self) -> Option<Arc<PublicParameters>> {
        self.cache.get().cloned()
    }
}

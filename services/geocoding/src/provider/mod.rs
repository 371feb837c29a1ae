//! Reverse geocoding providers
//!
//! A provider turns a coordinate into a human-readable address with one
//! HTTP call. Which provider is active is a configuration choice; the
//! lookup service only sees [`ReverseGeocoder`].

mod nominatim;
mod photon;

pub use nominatim::NominatimProvider;
pub use photon::PhotonProvider;

use crate::error::ProviderError;
use crate::Coordinate;
use async_trait::async_trait;
use core_config::{LookupSettings, ProviderKind};
use reqwest::Client;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// One reverse geocoding backend
#[async_trait]
pub trait ReverseGeocoder: Send + Sync + Debug {
    /// Short name for logs and status output
    fn name(&self) -> &'static str;

    /// Resolve `coord` to an address, giving up after `timeout`
    async fn reverse_geocode(
        &self,
        coord: Coordinate,
        timeout: Duration,
    ) -> Result<String, ProviderError>;
}

/// Build the provider selected by `settings`
pub fn build_provider(
    settings: &LookupSettings,
) -> Result<Arc<dyn ReverseGeocoder>, ProviderError> {
    let client = http_client(&settings.user_agent)?;
    let base_url = settings.provider_url.as_deref();

    let provider: Arc<dyn ReverseGeocoder> = match settings.provider {
        ProviderKind::Public => Arc::new(NominatimProvider::new(client, base_url)?),
        ProviderKind::Local => Arc::new(PhotonProvider::new(client, base_url)?),
    };
    Ok(provider)
}

/// Shared HTTP client; per-call timeouts are set on each request
pub fn http_client(user_agent: &str) -> Result<Client, ProviderError> {
    Client::builder()
        .user_agent(user_agent)
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(4)
        .tcp_nodelay(true)
        .build()
        .map_err(|e| ProviderError::Config(format!("failed to build HTTP client: {}", e)))
}

/// `{base}/reverse`, validated once at construction
fn reverse_endpoint(base: &str) -> Result<Url, ProviderError> {
    let endpoint = format!("{}/reverse", base.trim_end_matches('/'));
    Url::parse(&endpoint)
        .map_err(|e| ProviderError::Config(format!("invalid provider URL {}: {}", base, e)))
}

/// Send a prepared request and decode a JSON body of type `T`
async fn fetch_json<T>(request: reqwest::RequestBuilder) -> Result<T, ProviderError>
where
    T: serde::de::DeserializeOwned,
{
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::Status(status.as_u16()));
    }

    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| ProviderError::Malformed(e.to_string()))
}

//! Self-hosted Photon provider

use super::{fetch_json, reverse_endpoint, ReverseGeocoder};
use crate::error::ProviderError;
use crate::Coordinate;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://photon.komoot.io";

/// Properties joined into the address, in order
const ADDRESS_KEYS: [&str; 5] = ["name", "street", "housenumber", "city", "district"];

/// Photon `/reverse` client
#[derive(Debug, Clone)]
pub struct PhotonProvider {
    client: Client,
    endpoint: Url,
}

impl PhotonProvider {
    pub fn new(client: Client, base_url: Option<&str>) -> Result<Self, ProviderError> {
        Ok(Self {
            client,
            endpoint: reverse_endpoint(base_url.unwrap_or(DEFAULT_BASE_URL))?,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl ReverseGeocoder for PhotonProvider {
    fn name(&self) -> &'static str {
        "photon"
    }

    async fn reverse_geocode(
        &self,
        coord: Coordinate,
        timeout: Duration,
    ) -> Result<String, ProviderError> {
        let request = self
            .client
            .get(self.endpoint.clone())
            .query(&[("lat", coord.lat), ("lon", coord.lon)])
            .timeout(timeout);

        let response: PhotonResponse = fetch_json(request).await?;
        extract_address(&response).ok_or(ProviderError::NoAddress)
    }
}

/// GeoJSON feature collection returned by Photon
#[derive(Debug, Default, Deserialize)]
pub(crate) struct PhotonResponse {
    #[serde(default)]
    features: Vec<PhotonFeature>,
}

#[derive(Debug, Default, Deserialize)]
struct PhotonFeature {
    #[serde(default)]
    properties: Map<String, Value>,
}

/// Distinct non-empty address properties of the first feature, joined
pub(crate) fn extract_address(response: &PhotonResponse) -> Option<String> {
    let properties = &response.features.first()?.properties;

    let mut parts: Vec<String> = Vec::new();
    for key in ADDRESS_KEYS {
        let value = match properties.get(key) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => continue,
        };
        if !value.is_empty() && !parts.contains(&value) {
            parts.push(value);
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> PhotonResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_properties_joined_in_order() {
        let response = parse(
            r#"{"type": "FeatureCollection", "features": [
                {"properties": {"city": "Baku", "street": "Nizami St",
                 "housenumber": 12, "district": "Sabail", "country": "Azerbaijan"}},
                {"properties": {"name": "ignored"}}
            ]}"#,
        );
        assert_eq!(
            extract_address(&response).as_deref(),
            Some("Nizami St, 12, Baku, Sabail")
        );
    }

    #[test]
    fn test_duplicate_values_skipped() {
        let response = parse(
            r#"{"features": [{"properties": {"name": "Baku", "city": "Baku", "district": ""}}]}"#,
        );
        assert_eq!(extract_address(&response).as_deref(), Some("Baku"));
    }

    #[test]
    fn test_no_features_is_no_address() {
        assert_eq!(extract_address(&parse(r#"{"features": []}"#)), None);
        assert_eq!(extract_address(&parse(r#"{}"#)), None);
        assert_eq!(
            extract_address(&parse(r#"{"features": [{"properties": {"country": "AZ"}}]}"#)),
            None
        );
    }

    #[test]
    fn test_custom_base_url() {
        let provider =
            PhotonProvider::new(Client::new(), Some("http://photon.internal:2322")).unwrap();
        assert_eq!(
            provider.endpoint().as_str(),
            "http://photon.internal:2322/reverse"
        );
    }
}

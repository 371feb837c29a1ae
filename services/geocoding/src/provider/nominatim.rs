//! Public OpenStreetMap Nominatim provider

use super::{fetch_json, reverse_endpoint, ReverseGeocoder};
use crate::error::ProviderError;
use crate::Coordinate;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org";

/// Nominatim `/reverse` client. The public instance allows one request per
/// second and requires an identifying User-Agent.
#[derive(Debug, Clone)]
pub struct NominatimProvider {
    client: Client,
    endpoint: Url,
}

impl NominatimProvider {
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
impl ReverseGeocoder for NominatimProvider {
    fn name(&self) -> &'static str {
        "nominatim"
    }

    async fn reverse_geocode(
        &self,
        coord: Coordinate,
        timeout: Duration,
    ) -> Result<String, ProviderError> {
        let request = self
            .client
            .get(self.endpoint.clone())
            .query(&[
                ("format", "jsonv2".to_string()),
                ("lat", coord.lat.to_string()),
                ("lon", coord.lon.to_string()),
                ("zoom", "18".to_string()),
                ("addressdetails", "1".to_string()),
            ])
            .timeout(timeout);

        let response: NominatimResponse = fetch_json(request).await?;
        if let Some(error) = &response.error {
            debug!(%coord, %error, "Nominatim reported an error");
        }
        extract_address(&response).ok_or(ProviderError::NoAddress)
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct NominatimResponse {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    address: Option<NominatimAddress>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    road: Option<String>,
    street: Option<String>,
    pedestrian: Option<String>,
    house_number: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    suburb: Option<String>,
    neighbourhood: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// `display_name` when present, otherwise street, number and locality
/// from the address breakdown, otherwise the suburb
pub(crate) fn extract_address(response: &NominatimResponse) -> Option<String> {
    if let Some(name) = non_empty(&response.display_name) {
        return Some(name.to_string());
    }

    let address = response.address.as_ref()?;
    let mut parts: Vec<&str> = Vec::new();

    if let Some(street) = non_empty(&address.road)
        .or_else(|| non_empty(&address.street))
        .or_else(|| non_empty(&address.pedestrian))
    {
        parts.push(street);
    }
    if let Some(number) = non_empty(&address.house_number) {
        parts.push(number);
    }
    if let Some(locality) = non_empty(&address.city)
        .or_else(|| non_empty(&address.town))
        .or_else(|| non_empty(&address.village))
    {
        if !parts.contains(&locality) {
            parts.push(locality);
        }
    }

    if !parts.is_empty() {
        return Some(parts.join(", "));
    }

    non_empty(&address.suburb)
        .or_else(|| non_empty(&address.neighbourhood))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> NominatimResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_display_name_preferred() {
        let response = parse(
            r#"{"display_name": "28 May St 5, Baku, Azerbaijan",
                "address": {"road": "28 May St", "city": "Baku"}}"#,
        );
        assert_eq!(
            extract_address(&response).as_deref(),
            Some("28 May St 5, Baku, Azerbaijan")
        );
    }

    #[test]
    fn test_address_parts_fallback() {
        let response = parse(
            r#"{"address": {"pedestrian": "Fountain Square", "house_number": "3",
                "town": "Baku", "suburb": "Sabail"}}"#,
        );
        assert_eq!(
            extract_address(&response).as_deref(),
            Some("Fountain Square, 3, Baku")
        );
    }

    #[test]
    fn test_locality_not_repeated() {
        let response = parse(r#"{"address": {"road": "Baku", "city": "Baku"}}"#);
        assert_eq!(extract_address(&response).as_deref(), Some("Baku"));
    }

    #[test]
    fn test_suburb_last_resort() {
        let response = parse(r#"{"address": {"neighbourhood": "Icheri Sheher"}}"#);
        assert_eq!(extract_address(&response).as_deref(), Some("Icheri Sheher"));
    }

    #[test]
    fn test_error_body_has_no_address() {
        let response = parse(r#"{"error": "Unable to geocode"}"#);
        assert_eq!(extract_address(&response), None);

        let response = parse(r#"{"display_name": "  ", "address": {}}"#);
        assert_eq!(extract_address(&response), None);
    }

    #[test]
    fn test_default_endpoint() {
        let provider = NominatimProvider::new(Client::new(), None).unwrap();
        assert_eq!(
            provider.endpoint().as_str(),
            "https://nominatim.openstreetmap.org/reverse"
        );
    }
}

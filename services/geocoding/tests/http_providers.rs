//! Provider calls against a local HTTP responder

use core_config::{ProviderKind, Settings};
use geocoding_service::provider::http_client;
use geocoding_service::{
    Coordinate, GeocodingService, LookupError, LookupOutcome, NominatimProvider, PhotonProvider,
    ProviderError, ReverseGeocoder,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve `status` and `body` to every request, after `delay`, recording
/// request heads
async fn responder(
    status: &'static str,
    body: &'static str,
    delay: Duration,
) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let requests = Arc::new(Mutex::new(Vec::new()));

    let seen = Arc::clone(&requests);
    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => return,
            };
            let seen = Arc::clone(&seen);
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                seen.lock()
                    .unwrap()
                    .push(String::from_utf8_lossy(&buf[..n]).into_owned());

                tokio::time::sleep(delay).await;
                let response = format!(
                    "HTTP/1.1 {}\r\n\
                     Content-Type: application/json\r\n\
                     Content-Length: {}\r\n\
                     Connection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    });

    (base, requests)
}

const BAKU: Coordinate = Coordinate {
    lat: 40.41,
    lon: 49.87,
};

#[tokio::test]
async fn test_nominatim_request_and_response() {
    let (base, requests) = responder(
        "200 OK",
        r#"{"display_name": "Nizami St 12, Baku, Azerbaijan"}"#,
        Duration::ZERO,
    )
    .await;

    let client = http_client("attendance-core-test/1.0").unwrap();
    let provider = NominatimProvider::new(client, Some(&base)).unwrap();
    let address = provider
        .reverse_geocode(BAKU, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(address, "Nizami St 12, Baku, Azerbaijan");

    let head = requests.lock().unwrap()[0].clone();
    assert!(head.starts_with("GET /reverse?"));
    assert!(head.contains("format=jsonv2"));
    assert!(head.contains("lat=40.41"));
    assert!(head.contains("lon=49.87"));
    assert!(head.contains("zoom=18"));
    assert!(head.contains("addressdetails=1"));
    assert!(head.to_ascii_lowercase().contains("user-agent: attendance-core-test/1.0"));
}

#[tokio::test]
async fn test_photon_response() {
    let (base, _requests) = responder(
        "200 OK",
        r#"{"features": [{"properties":
            {"street": "Nizami St", "housenumber": "12", "city": "Baku"}}]}"#,
        Duration::ZERO,
    )
    .await;

    let provider = PhotonProvider::new(http_client("test").unwrap(), Some(&base)).unwrap();
    let address = provider
        .reverse_geocode(BAKU, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(address, "Nizami St, 12, Baku");
}

#[tokio::test]
async fn test_error_status_is_reported() {
    let (base, _requests) = responder("503 Service Unavailable", "{}", Duration::ZERO).await;

    let provider = NominatimProvider::new(http_client("test").unwrap(), Some(&base)).unwrap();
    let err = provider
        .reverse_geocode(BAKU, Duration::from_secs(2))
        .await
        .unwrap_err();
    assert_eq!(err, ProviderError::Status(503));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_malformed_body_is_reported() {
    let (base, _requests) = responder("200 OK", "<html>busy</html>", Duration::ZERO).await;

    let provider = PhotonProvider::new(http_client("test").unwrap(), Some(&base)).unwrap();
    let err = provider
        .reverse_geocode(BAKU, Duration::from_secs(2))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Malformed(_)));
}

#[tokio::test]
async fn test_slow_provider_times_out() {
    let (base, _requests) = responder("200 OK", "{}", Duration::from_secs(5)).await;

    let provider = NominatimProvider::new(http_client("test").unwrap(), Some(&base)).unwrap();
    let err = provider
        .reverse_geocode(BAKU, Duration::from_millis(200))
        .await
        .unwrap_err();
    assert_eq!(err, ProviderError::Timeout);
}

#[tokio::test]
async fn test_service_degrades_on_empty_result() {
    let (base, requests) = responder("200 OK", r#"{"features": []}"#, Duration::ZERO).await;

    let mut settings = Settings::default().lookup;
    settings.enabled = true;
    settings.provider = ProviderKind::Local;
    settings.provider_url = Some(base);
    settings.rate_limit_rps = 0.0;

    let service = GeocodingService::new(settings).unwrap();
    assert_eq!(service.provider_name(), "photon");

    let outcome = service.lookup(BAKU, Duration::from_secs(2)).await;
    assert_eq!(
        outcome,
        LookupOutcome::Unavailable(LookupError::Provider(ProviderError::NoAddress))
    );
    assert!(service.cache().is_empty());

    // Nothing cached, so the provider is asked again
    service.lookup(BAKU, Duration::from_secs(2)).await;
    assert_eq!(requests.lock().unwrap().len(), 2);
}

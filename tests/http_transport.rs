// End-to-end tests of both HTTP transports against a wiremock server.

use serde_json::{Value, json};
use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use std::time::Duration;

use indego_client::{ClientConfig, Credentials, IndegoAsyncClient, IndegoClient, IndegoError, RetryPolicy};

fn fixture(name: &str) -> Value {
    let raw = std::fs::read_to_string(format!("{}/tests/data/{}", env!("CARGO_MANIFEST_DIR"), name)).unwrap();
    serde_json::from_str(&raw).unwrap()
}

fn config(server: &MockServer) -> ClientConfig {
    ClientConfig::new(Credentials::basic("me@example.com", "secret"))
        .with_api_url(format!("{}/api/v1", server.uri()))
        .raise_request_exceptions(true)
}

async fn mount_login(server: &MockServer, expected_logins: u64) {
    Mock::given(method("POST"))
        .and(path("/api/v1/authenticate"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"contextId": "ctx-1", "userId": "user-1"})))
        .expect(expected_logins)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/alms"))
        .and(header("x-im-context-id", "ctx-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"alm_sn": "123", "alm_name": "Garden"}])))
        .mount(server)
        .await;
}

// ── Async (reqwest) ─────────────────────────────────────────────────

#[tokio::test]
async fn async_login_and_state() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/alms/123/state"))
        .and(query_param("longpoll", "true"))
        .and(query_param("last", "64513"))
        .respond_with(ResponseTemplate::new(504))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/alms/123/state"))
        .and(header("x-im-context-id", "ctx-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixture("state.json")))
        .mount(&server)
        .await;

    let mut client = IndegoAsyncClient::new(config(&server)).unwrap();
    assert!(client.start().await.unwrap());
    assert_eq!(client.serial().as_deref(), Some("123"));
    assert_eq!(client.mowers_in_account().len(), 1);

    let state = client.get_state(false, false, 120).await.unwrap().cloned().unwrap();
    assert_eq!(state.state, Some(64513));

    // Gateway timeout on a long-poll keeps what we had
    client.update_state(false, true, 10).await.unwrap();
    assert_eq!(client.data().state.as_ref(), Some(&state));
    client.close().await;
}

#[tokio::test]
async fn async_command_is_put_as_json() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/alms/123/state"))
        .and(body_json(json!({"state": "returnToDock"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = IndegoAsyncClient::new(config(&server)).unwrap();
    assert!(client.login().await.unwrap());
    assert!(client.put_command("returnToDock").await.unwrap());
    assert!(client.put_command("sprint").await.is_err());
}

#[tokio::test]
async fn async_expired_session_logs_in_again() {
    let server = MockServer::start().await;
    mount_login(&server, 2).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/alms/123/operatingData"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/alms/123/operatingData"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixture("operating_data.json")))
        .mount(&server)
        .await;

    let mut client = IndegoAsyncClient::new(config(&server)).unwrap();
    assert!(client.login().await.unwrap());
    let operating = client.get_operating_data().await.unwrap().cloned().unwrap();
    assert_eq!(operating.battery.percent, Some(86));
    assert!(client.session().authenticated);
}

#[tokio::test]
async fn async_map_download_writes_svg() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/alms/123/map"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"<svg/>".to_vec(), "image/svg+xml"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("garden.svg");
    let mut client = IndegoAsyncClient::new(config(&server)).unwrap();
    assert!(client.login().await.unwrap());
    assert!(client.download_map(Some(target.as_path())).await.unwrap());
    assert_eq!(std::fs::read(&target).unwrap(), b"<svg/>");
}

// ── Blocking (ureq) ─────────────────────────────────────────────────

#[tokio::test]
async fn blocking_client_round_trip() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/alms/123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixture("generic_data.json")))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/alms/123/predictive"))
        .and(body_json(json!({"enabled": false})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = config(&server);
    let result = tokio::task::spawn_blocking(move || {
        let mut client = IndegoClient::new(config);
        assert!(client.login().unwrap());
        let generic = client.get_generic_data().unwrap().cloned().unwrap();
        assert!(client.put_mow_mode(false).unwrap());
        generic
    })
    .await
    .unwrap();
    assert_eq!(result.alm_sn.as_deref(), Some("123456789"));
}

#[tokio::test]
async fn blocking_client_raises_server_errors_without_retrying() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/alms/123/network"))
        .respond_with(ResponseTemplate::new(502))
        .expect(1)
        .mount(&server)
        .await;

    let config = config(&server);
    let (error, failures) = tokio::task::spawn_blocking(move || {
        let mut client = IndegoClient::new(config);
        assert!(client.login().unwrap());
        let error = client.update_network().unwrap_err();
        (error, client.session().offline_failures)
    })
    .await
    .unwrap();
    assert!(matches!(error, IndegoError::Http { status: 502, .. }), "{:?}", error);
    assert_eq!(failures, 1);
}

#[tokio::test]
async fn blocking_client_retries_timeouts() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/alms/123/network"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let config = config(&server)
        .with_timeout(Duration::from_millis(200))
        .with_retry(RetryPolicy {
            backoff: Duration::ZERO,
            ..RetryPolicy::default()
        });
    let (network, failures) = tokio::task::spawn_blocking(move || {
        let mut client = IndegoClient::new(config);
        assert!(client.login().unwrap());
        let network = client.get_network().unwrap().cloned();
        (network, client.session().offline_failures)
    })
    .await
    .unwrap();
    assert_eq!(network, None);
    assert_eq!(failures, 1);

    let hits = server.received_requests().await.unwrap();
    let network_hits = hits.iter().filter(|r| r.url.path() == "/api/v1/alms/123/network").count();
    assert_eq!(network_hits, 5);
}

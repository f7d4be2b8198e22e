use httpmock::prelude::*;
use itd_cli::{render_exclusions, DaemonClient};
use serde_json::json;

#[tokio::test]
async fn exclude_posts_symbols_and_renders_the_set() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/exclusions/exclude")
                .json_body(json!({"symbols": ["TCS", "SBIN"]}));
            then.status(200)
                .json_body(json!({"changed": ["SBIN", "TCS"], "excluded": ["SBIN", "TCS"]}));
        })
        .await;

    let client = DaemonClient::new(server.base_url()).unwrap();
    let resp = client.exclude(&["TCS".into(), "SBIN".into()]).await.unwrap();
    m.assert_async().await;
    assert_eq!(render_exclusions(&resp), "changed=SBIN,TCS\nexcluded=SBIN,TCS");
}

#[tokio::test]
async fn unknown_symbols_surface_the_invalid_list() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/exclusions/exclude");
            then.status(400).json_body(json!({
                "error": "symbols not in the configured universe: DOGE",
                "invalid": ["DOGE"]
            }));
        })
        .await;

    let client = DaemonClient::new(format!("{}/", server.base_url())).unwrap();
    let err = client.exclude(&["DOGE".into()]).await.unwrap_err();
    assert!(err.to_string().contains("invalid: DOGE"), "{err}");
}

#[tokio::test]
async fn list_reads_current_exclusions() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/exclusions");
            then.status(200).json_body(json!({"excluded": ["INFY"]}));
        })
        .await;

    let client = DaemonClient::new(server.base_url()).unwrap();
    let resp = client.list_exclusions().await.unwrap();
    assert_eq!(resp.excluded, vec!["INFY".to_string()]);
    assert!(resp.changed.is_empty());
}

#[tokio::test]
async fn server_errors_are_reported_with_status() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/exclusions/include");
            then.status(500).json_body(json!({"error": "exclusion store: disk full"}));
        })
        .await;

    let client = DaemonClient::new(server.base_url()).unwrap();
    let err = client.include(&["TCS".into()]).await.unwrap_err();
    assert!(err.to_string().contains("500"), "{err}");
    assert!(err.to_string().contains("disk full"), "{err}");
}

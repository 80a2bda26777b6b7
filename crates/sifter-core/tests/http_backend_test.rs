#![allow(clippy::unwrap_used, clippy::expect_used)]
//! HTTP backend tests against a mock server.

use std::time::Duration;

use mockito::{Matcher, Server};
use serde_json::json;
use url::Url;

use sifter_core::ExplorerError;
use sifter_core::backend::{ExplorerBackend, HttpBackend, parse_aggregation_response};
use sifter_core::config::{BackendConfig, ExplorerConfig};
use sifter_core::filter::FilterState;
use sifter_core::query::{GqlFilter, GraphQlRequest};
use sifter_core::session::FilterSession;

fn config_for(server: &Server) -> BackendConfig {
    BackendConfig {
        backend_url: Url::parse(&server.url()).unwrap(),
        graphql_path: "/graphql".to_string(),
        status_path: "/_status".to_string(),
        request_timeout: Duration::from_secs(5),
        search_page_size: 20,
    }
}

#[tokio::test]
async fn graphql_posts_query_and_variables() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/graphql")
        .match_body(Matcher::PartialJson(json!({"variables": {"filter": {"IN": {"gender": ["F"]}}}})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data": {"_aggregation": {"subject": {"gender": {"histogram": [{"key": "F", "count": 2}]}}}}}"#)
        .create_async()
        .await;

    let backend = HttpBackend::new(&config_for(&server)).unwrap();
    let filter = GqlFilter::in_values("gender", ["F"]);
    let request = GraphQlRequest::aggregation("subject", &["gender".to_string()], Some(&filter));
    let body = backend.graphql(&request).await.unwrap();

    let aggs = parse_aggregation_response(&body, "subject").unwrap();
    assert_eq!(aggs["gender"].histogram[0].count, 2);
    mock.assert_async().await;
}

#[tokio::test]
async fn graphql_error_body_is_returned_as_json() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/graphql")
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(r#"{"errors": [{"message": "bad filter"}]}"#)
        .create_async()
        .await;

    let backend = HttpBackend::new(&config_for(&server)).unwrap();
    let body = backend.graphql(&GraphQlRequest::new("{ x }")).await.unwrap();

    let err = parse_aggregation_response(&body, "subject").unwrap_err();
    assert_eq!(err.to_string(), "error querying backend: bad filter");
}

#[tokio::test]
async fn non_json_body_is_a_decode_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/graphql")
        .with_status(502)
        .with_body("<html>Bad Gateway</html>")
        .create_async()
        .await;

    let backend = HttpBackend::new(&config_for(&server)).unwrap();
    let err = backend.graphql(&GraphQlRequest::new("{ x }")).await.unwrap_err();

    match err {
        ExplorerError::Decode(message) => assert!(message.starts_with("HTTP 502")),
        other => panic!("expected decode error, got {other:?}"),
    }
}

#[tokio::test]
async fn field_status_reads_status_document() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/_status")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"indices": {"subject": {"fields": ["gender"]}}}"#)
        .create_async()
        .await;

    let backend = HttpBackend::new(&config_for(&server)).unwrap();
    let status = backend.field_status().await.unwrap();

    assert_eq!(status["indices"]["subject"]["fields"], json!(["gender"]));
    mock.assert_async().await;
}

#[tokio::test]
async fn field_status_server_error_is_transport() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/_status")
        .with_status(500)
        .create_async()
        .await;

    let backend = HttpBackend::new(&config_for(&server)).unwrap();
    let err = backend.field_status().await.unwrap_err();

    assert!(matches!(err, ExplorerError::Transport(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn custom_paths_are_joined_to_base_url() {
    let server = Server::new_async().await;
    let mut config = config_for(&server);
    config.graphql_path = "/guppy/graphql".to_string();

    let backend = HttpBackend::new(&config).unwrap();
    assert_eq!(backend.graphql_url().path(), "/guppy/graphql");
}

#[tokio::test]
async fn connected_session_uses_configured_search_page_size() {
    let mut server = Server::new_async().await;
    let url = server.url();
    let backend_config = BackendConfig::from_lookup(|key| match key {
        "SIFTER_BACKEND_URL" => Some(url.clone()),
        "SIFTER_SEARCH_PAGE_SIZE" => Some("7".to_string()),
        _ => None,
    })
    .unwrap();

    server
        .mock("POST", "/graphql")
        .match_body(Matcher::Regex("filterSelf: false".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"data": {"_aggregation": {"subject": {
                "site": {"histogram": [{"key": "north", "count": 1}]},
                "gender": {"histogram": [{"key": "F", "count": 1}]}
            }}}}"#,
        )
        .create_async()
        .await;
    let search = server
        .mock("POST", "/graphql")
        .match_body(Matcher::Regex("offset: 0, first: 7,".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data": {"subject": [{"site": "north"}], "_aggregation": {"subject": {"_totalCount": 1}}}}"#)
        .create_async()
        .await;

    let explorer = ExplorerConfig::from_json_str(
        r#"{"dataType": "subject", "filters": {"tabs": [
            {"title": "Subject", "fields": ["gender"], "searchFields": ["site"]}
        ]}}"#,
    )
    .unwrap();
    let session = FilterSession::connect(&backend_config, explorer).unwrap();
    assert_eq!(session.search_page_size(), 7);

    session.apply_filter(FilterState::new()).await.unwrap();
    let tabs = session.render_tabs();
    let loader = tabs[0].sections[0].search_loader.as_ref().unwrap();
    assert_eq!(loader.page_size(), 7);

    let page = loader.load_options("", 0).await.unwrap();
    assert_eq!(page.options.len(), 1);
    search.assert_async().await;
}

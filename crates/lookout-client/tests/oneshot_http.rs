mod common;

use common::FakeGateway;
use lookout_client::{ClientError, HttpTokenSource, QueryClient, StaticTokenSource};

#[test_timeout::tokio_timeout_test(20)]
async fn each_query_fetches_a_fresh_token() {
    let gateway = FakeGateway::spawn().await;
    let client = QueryClient::new(gateway.graphql_url(), HttpTokenSource::new(gateway.auth_url()));

    let body = client
        .query_once("getStates { view_processes { name } }")
        .await
        .expect("query");
    assert_eq!(body["data"]["query"], "query getStates { view_processes { name } }");
    client.query_once("again { x }").await.expect("second query");

    let queries = gateway.queries();
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0].authorization.as_deref(), Some("Bearer tok-1"));
    assert_eq!(queries[1].authorization.as_deref(), Some("Bearer tok-2"));
    assert_eq!(
        queries[0].content_type.as_deref(),
        Some("application/json; charset=utf-8")
    );
}

#[test_timeout::tokio_timeout_test(20)]
async fn rejected_credentials_never_reach_the_query_endpoint() {
    let gateway = FakeGateway::spawn().await;
    let tokens = HttpTokenSource::new(gateway.auth_url()).with_credentials("admin", "wrong");
    let client = QueryClient::new(gateway.graphql_url(), tokens);

    let err = client.query_once("getStates { x }").await.unwrap_err();
    match err {
        ClientError::Auth { status, body } => {
            assert_eq!(status.as_u16(), 400);
            assert!(body.contains("wrong credentials"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(gateway.queries().is_empty());

    let tokens = HttpTokenSource::new(gateway.auth_url()).with_credentials("admin", "secret");
    let client = QueryClient::new(gateway.graphql_url(), tokens);
    client.query_once("getStates { x }").await.expect("query");
    assert_eq!(gateway.queries().len(), 1);
}

#[test_timeout::tokio_timeout_test(20)]
async fn typed_helpers_decode_views_and_errors() {
    let gateway = FakeGateway::spawn().await;
    let client = QueryClient::new(gateway.graphql_url(), StaticTokenSource::new("static"));

    let config = client
        .latest_config()
        .await
        .expect("latest config")
        .expect("one record");
    assert_eq!(config.comment.as_deref(), Some("initial"));
    assert!(config.raw_config.contains("10.0.0.0/8"));

    let err = client.query_data::<serde_json::Value>("broken { x }").await.unwrap_err();
    assert!(matches!(err, ClientError::Graphql(_)));

    let body = client
        .execute("mutation { ignore(key: \"k\") { affected_rows } }")
        .await
        .expect("execute");
    assert_eq!(body["data"]["query"], "mutation { ignore(key: \"k\") { affected_rows } }");
    assert!(gateway
        .queries()
        .iter()
        .all(|query| query.authorization.as_deref() == Some("Bearer static")));
}

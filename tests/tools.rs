//! Tool dispatch against a mocked MessengerFlow API.
use messengerflow_mcp::{
    config::ApiConfig,
    resources,
    schema::CallToolResult,
    tools::{self, ToolSpec},
    with_bearer_token, ApiClient, Arguments,
};
use serde_json::{json, Value};
use wiremock::{
    matchers::{body_json, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn client_for(server: &MockServer) -> ApiClient {
    ApiClient::new(&ApiConfig::new("mf_test_key", server.uri())).unwrap()
}

async fn call(server: &MockServer, tool: &ToolSpec, arguments: Value) -> CallToolResult {
    let arguments: Arguments = serde_json::from_value(arguments).unwrap();
    tools::dispatch(&client_for(server), tool, Some(arguments)).await
}

fn parsed(result: &CallToolResult) -> Value {
    assert_ne!(result.is_error, Some(true), "unexpected failure: {:?}", result.text());
    serde_json::from_str(result.text().unwrap()).unwrap()
}

#[tokio::test]
async fn test_start_campaign_unpauses() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/campaigns"))
        .and(header("X-Api-Key", "mf_test_key"))
        .and(body_json(json!({"id": "c1", "paused": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "c1", "paused": false})))
        .expect(1)
        .mount(&server)
        .await;

    let result = call(&server, &tools::CAMPAIGNS, json!({"action": "start", "id": "c1"})).await;
    assert_eq!(parsed(&result), json!({"id": "c1", "paused": false}));
}

#[tokio::test]
async fn test_missing_id_never_reaches_api() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = call(&server, &tools::CAMPAIGNS, json!({"action": "stop"})).await;
    assert_eq!(result.is_error, Some(true));
    assert_eq!(result.text(), Some("Error: Campaign ID is required"));

    let result = call(&server, &tools::CAMPAIGNS, json!({"action": "stop", "id": ""})).await;
    assert_eq!(result.text(), Some("Error: Campaign ID is required"));
}

#[tokio::test]
async fn test_account_assignment_needs_both_ids() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/campaigns/accounts"))
        .and(body_json(json!({"campaign_id": "c1", "account_id": "a1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let result = call(&server, &tools::CAMPAIGNS, json!({"action": "add_account", "id": "c1"})).await;
    assert_eq!(result.text(), Some("Error: Account ID is required"));

    let result = call(
        &server,
        &tools::CAMPAIGNS,
        json!({"action": "add_account", "id": "c1", "account_id": "a1"}),
    )
    .await;
    assert_eq!(parsed(&result), json!({"ok": true}));
}

#[tokio::test]
async fn test_listing_forwards_paging() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/leads/col-9/leads"))
        .and(query_param("limit", "25"))
        .and(query_param("offset", "50"))
        .and(query_param("search", "anna"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"leads": [], "total": 0})))
        .expect(1)
        .mount(&server)
        .await;

    let result = call(
        &server,
        &tools::LEADS,
        json!({"action": "get_leads", "id": "col-9", "limit": 25, "offset": 50, "search": "anna"}),
    )
    .await;
    assert_eq!(parsed(&result)["total"], 0);
}

#[tokio::test]
async fn test_id_stays_within_its_segment() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/leads/col%2F1%3Fx"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let result = call(&server, &tools::LEADS, json!({"action": "delete", "id": "col/1?x"})).await;
    assert_eq!(result.text(), Some("{}"));

    let result = call(&server, &tools::LEADS, json!({"action": "delete", "id": ".."})).await;
    assert_eq!(result.is_error, Some(true));
    assert_eq!(result.text(), Some("Error: Invalid id \"..\""));
}

#[tokio::test]
async fn test_caller_token_is_not_sent_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/accounts"))
        .and(header("X-Api-Key", "mf_test_key"))
        .and(|request: &wiremock::Request| !request.headers.contains_key("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let result = with_bearer_token(
        "caller-token",
        call(&server, &tools::ACCOUNTS, json!({"action": "list"})),
    )
    .await;
    assert_eq!(parsed(&result), json!([]));
}

#[tokio::test]
async fn test_no_content_is_empty_object() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/leads/col-1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let result = call(&server, &tools::LEADS, json!({"action": "delete", "id": "col-1"})).await;
    assert_eq!(result.text(), Some("{}"));
}

#[tokio::test]
async fn test_unknown_action_lists_choices() {
    let server = MockServer::start().await;
    let result = call(&server, &tools::ANALYTICS, json!({"action": "forecast"})).await;
    assert_eq!(result.is_error, Some(true));
    assert_eq!(
        result.text(),
        Some(
            "Error: Invalid action \"forecast\". Expected one of: dashboard_stats, activity_chart, \
             performance, messages_chart, bookings_chart"
        )
    );
}

#[tokio::test]
async fn test_upstream_failures_become_error_envelopes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dashboard/stats"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dashboard/activity"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "12"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dashboard/performance"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "database unavailable"})))
        .mount(&server)
        .await;

    let cases = [
        ("dashboard_stats", "Error: API key is invalid or revoked"),
        ("activity_chart", "Error: Rate limited. Retry after 12s"),
        ("performance", "Error: database unavailable"),
    ];
    for (action, expected) in cases {
        let result = call(&server, &tools::ANALYTICS, json!({"action": action})).await;
        assert_eq!(result.is_error, Some(true));
        assert_eq!(result.text(), Some(expected));
    }
}

#[tokio::test]
async fn test_dashboard_resource() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dashboard/stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"messages_sent": 42})))
        .expect(1)
        .mount(&server)
        .await;

    let result = resources::read_dashboard(&client_for(&server)).await.unwrap();
    assert_eq!(result.contents.len(), 1);
    assert_eq!(result.contents[0].uri, "messengerflow://dashboard");
    let data: Value = serde_json::from_str(&result.contents[0].text).unwrap();
    assert_eq!(data, json!({"messages_sent": 42}));
}

use std::sync::{Arc, Mutex};

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub mod auth;
pub mod config;
pub mod domain;
pub mod errors;
pub mod http;
pub mod logging;
pub mod mcp;
pub mod store;

use store::PackageStore;

/// Shared per-request state: the API token and the single package store
/// handle created at startup. Tool calls lock the store for their full
/// duration, so operations run one at a time against it.
#[derive(Clone)]
pub struct AppState {
    pub api_token: Arc<str>,
    pub store: Arc<Mutex<PackageStore>>,
}

impl AppState {
    pub fn new(api_token: String, store: Arc<Mutex<PackageStore>>) -> Self {
        Self {
            api_token: Arc::<str>::from(api_token),
            store,
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/mcp", post(http::handlers::mcp_endpoint))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer_token,
        ));

    Router::new()
        .route("/health", get(http::handlers::health))
        .route("/.well-known/mcp", get(http::handlers::discovery))
        .merge(protected)
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use tempfile::NamedTempFile;
    use tower::ServiceExt;

    use crate::store::PackageStore;

    use super::*;

    const API_TOKEN: &str = "token-1234567890ab";

    const FIXTURE: &str = "\
package_id,delivery_guy,weight_kg,size_cm,sender_name,sender_address,receiver_name,receiver_address,label,state
PKG001,1,2.5,10x10x10,Alice,123 St,Bob,456 Ave,FRAGILE,pending
PKG002,1,1.0,5x5x5,Charlie,789 Rd,Dave,101 Blvd,STANDARD,in_transit
PKG003,2,5.0,20x20x20,Eve,202 Ln,Frank,303 Dr,URGENT,pending
";

    fn app_with_fixture() -> (NamedTempFile, Router) {
        let mut file = NamedTempFile::new().expect("create temp csv");
        file.write_all(FIXTURE.as_bytes()).expect("write fixture");
        file.flush().expect("flush fixture");

        let store = PackageStore::load(file.path()).expect("load fixture");
        let state = AppState::new(API_TOKEN.to_string(), Arc::new(Mutex::new(store)));
        (file, build_app(state))
    }

    async fn mcp_response(app: &Router, body: String) -> (StatusCode, Vec<u8>) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/mcp")
                    .method("POST")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::AUTHORIZATION, format!("Bearer {API_TOKEN}"))
                    .body(Body::from(body))
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        (status, bytes.to_vec())
    }

    async fn mcp_json(app: &Router, body: String) -> serde_json::Value {
        let (status, bytes) = mcp_response(app, body).await;
        assert_eq!(status, StatusCode::OK);
        serde_json::from_slice(&bytes).expect("valid json response")
    }

    fn tool_call(id: u32, name: &str, arguments: serde_json::Value) -> String {
        serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": { "name": name, "arguments": arguments }
        })
        .to_string()
    }

    fn result_text(body: &serde_json::Value) -> &str {
        body["result"]["content"][0]["text"]
            .as_str()
            .expect("text content")
    }

    #[tokio::test]
    async fn health_is_public() {
        let (_file, app) = app_with_fixture();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .method("GET")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        assert_eq!(body, "{\"status\":\"ok\"}");
    }

    #[tokio::test]
    async fn discovery_is_public() {
        let (_file, app) = app_with_fixture();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/.well-known/mcp")
                    .method("GET")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        let body_json: serde_json::Value =
            serde_json::from_slice(&body).expect("valid json response");
        assert_eq!(body_json["mcp_endpoint"], "/mcp");
    }

    #[tokio::test]
    async fn mcp_requires_token() {
        let (_file, app) = app_with_fixture();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/mcp")
                    .method("POST")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn mcp_rejects_wrong_token() {
        let (_file, app) = app_with_fixture();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/mcp")
                    .method("POST")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::AUTHORIZATION, "Bearer wrong-token-000000")
                    .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn mcp_initialize_returns_result() {
        let (_file, app) = app_with_fixture();

        let body = mcp_json(
            &app,
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","clientInfo":{"name":"test-client","version":"1.0.0"},"capabilities":{}}}"#.to_string(),
        )
        .await;

        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["id"], 1);
        assert_eq!(body["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(body["result"]["serverInfo"]["name"], env!("CARGO_PKG_NAME"));
        assert_eq!(
            body["result"]["serverInfo"]["version"],
            env!("CARGO_PKG_VERSION")
        );
        assert!(body["result"]["capabilities"]["tools"].is_object());
        assert!(body["result"]["capabilities"]["resources"].is_object());
        assert!(body["result"]["capabilities"]["prompts"].is_null());
    }

    #[tokio::test]
    async fn mcp_unknown_method_returns_method_not_found() {
        let (_file, app) = app_with_fixture();

        let body = mcp_json(
            &app,
            r#"{"jsonrpc":"2.0","id":1,"method":"unknown"}"#.to_string(),
        )
        .await;

        assert_eq!(body["error"]["code"], -32601);
        assert_eq!(body["error"]["message"], "Method not found");
    }

    #[tokio::test]
    async fn mcp_tools_list_returns_all_package_tools() {
        let (_file, app) = app_with_fixture();

        let body = mcp_json(
            &app,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list","params":{}}"#.to_string(),
        )
        .await;

        let tools = body["result"]["tools"].as_array().expect("tools array");
        assert_eq!(tools.len(), 10);
        assert_eq!(tools[0]["name"], "get_packages_for_delivery_guy");
        assert_eq!(tools[9]["name"], "delete_packages");
    }

    #[tokio::test]
    async fn tools_call_lists_packages_for_delivery_guy() {
        let (_file, app) = app_with_fixture();

        let body = mcp_json(
            &app,
            tool_call(
                3,
                "get_packages_for_delivery_guy",
                serde_json::json!({"delivery_guy": 1}),
            ),
        )
        .await;

        assert_eq!(body["id"], 3);
        assert!(result_text(&body).starts_with("Packages for Delivery Guy 1:"));
        assert_eq!(
            body["result"]["structuredContent"]["packages"]
                .as_array()
                .map(Vec::len),
            Some(2)
        );
        assert_eq!(body["result"]["structuredContent"]["total"], 2);
    }

    #[tokio::test]
    async fn tools_call_reports_empty_delivery_guy() {
        let (_file, app) = app_with_fixture();

        let body = mcp_json(
            &app,
            tool_call(
                4,
                "get_packages_for_delivery_guy",
                serde_json::json!({"delivery_guy": 9}),
            ),
        )
        .await;

        assert_eq!(result_text(&body), "No packages found for delivery guy 9");
        assert_eq!(body["result"]["structuredContent"]["total"], 0);
    }

    #[tokio::test]
    async fn tools_call_package_details_not_found_is_tool_error() {
        let (_file, app) = app_with_fixture();

        let body = mcp_json(
            &app,
            tool_call(
                5,
                "get_package_details",
                serde_json::json!({"package_id": "PKG999"}),
            ),
        )
        .await;

        assert_eq!(result_text(&body), "Package PKG999 not found");
        assert_eq!(body["result"]["isError"], true);
    }

    #[tokio::test]
    async fn tools_call_delivery_guy_stats_aggregates() {
        let (_file, app) = app_with_fixture();

        let body = mcp_json(
            &app,
            tool_call(
                6,
                "get_delivery_guy_stats",
                serde_json::json!({"delivery_guy": 1}),
            ),
        )
        .await;

        let stats = &body["result"]["structuredContent"]["stats"];
        assert_eq!(stats["total_packages"], 2);
        assert_eq!(stats["total_weight_kg"], 3.5);
        assert_eq!(stats["fragile_packages"], 1);
        assert_eq!(stats["urgent_packages"], 0);
        assert!(result_text(&body).starts_with("Delivery Statistics - Guy 1:"));
    }

    #[tokio::test]
    async fn tools_call_lists_all_delivery_guys() {
        let (_file, app) = app_with_fixture();

        let body = mcp_json(
            &app,
            tool_call(7, "get_all_delivery_guys", serde_json::json!({})),
        )
        .await;

        assert_eq!(result_text(&body), "Available Delivery Guys: 1, 2");
        assert_eq!(
            body["result"]["structuredContent"]["delivery_guys"],
            serde_json::json!([1, 2])
        );
    }

    #[tokio::test]
    async fn tools_call_label_search_normalizes_case() {
        let (_file, app) = app_with_fixture();

        let body = mcp_json(
            &app,
            tool_call(
                8,
                "search_packages_by_label",
                serde_json::json!({"label": "fragile"}),
            ),
        )
        .await;

        assert_eq!(body["result"]["structuredContent"]["total"], 1);
        assert!(result_text(&body).contains("PKG001 - Delivery Guy 1"));
    }

    #[tokio::test]
    async fn tools_call_update_state_writes_through_to_the_file() {
        let (file, app) = app_with_fixture();

        let body = mcp_json(
            &app,
            tool_call(
                9,
                "update_package_state",
                serde_json::json!({"package_id": "PKG001", "new_state": "delivered"}),
            ),
        )
        .await;

        assert_eq!(
            result_text(&body),
            "Package PKG001 state updated from pending to delivered"
        );
        assert_eq!(body["result"]["structuredContent"]["old_state"], "pending");

        let persisted = std::fs::read_to_string(file.path()).expect("read backing file");
        assert!(persisted.contains("delivered"));

        // The same store instance serves the follow-up query.
        let body = mcp_json(
            &app,
            tool_call(
                10,
                "get_packages_by_state",
                serde_json::json!({"state": "DELIVERED"}),
            ),
        )
        .await;
        assert_eq!(body["result"]["structuredContent"]["total"], 1);
        assert!(result_text(&body).contains("PKG001 - Delivery Guy 1"));
    }

    #[tokio::test]
    async fn tools_call_add_new_package_persists() {
        let (file, app) = app_with_fixture();

        let body = mcp_json(
            &app,
            tool_call(
                11,
                "add_new_package",
                serde_json::json!({
                    "package_id": "PKG004",
                    "delivery_guy": 3,
                    "weight_kg": 4.5,
                    "label": "STANDARD",
                    "state": "pending"
                }),
            ),
        )
        .await;

        assert_eq!(result_text(&body), "Package PKG004 added successfully");

        let persisted = std::fs::read_to_string(file.path()).expect("read backing file");
        assert!(persisted.contains("PKG004,3,4.5"));

        let body = mcp_json(
            &app,
            tool_call(
                12,
                "get_package_details",
                serde_json::json!({"package_id": "PKG004"}),
            ),
        )
        .await;
        assert!(result_text(&body).starts_with("Package Details: PKG004"));
    }

    #[tokio::test]
    async fn tools_call_delete_packages_counts_only_existing_ids() {
        let (file, app) = app_with_fixture();

        let body = mcp_json(
            &app,
            tool_call(
                13,
                "delete_packages",
                serde_json::json!({"package_ids": ["PKG001", "PKG999", "PKG003"]}),
            ),
        )
        .await;

        assert_eq!(result_text(&body), "Deleted 2 packages successfully");
        assert_eq!(body["result"]["structuredContent"]["deleted"], 2);
        assert_eq!(body["result"]["structuredContent"]["requested"], 3);

        let persisted = std::fs::read_to_string(file.path()).expect("read backing file");
        assert!(!persisted.contains("PKG001"));
        assert!(persisted.contains("PKG002"));
        assert!(!persisted.contains("PKG003"));
    }

    #[tokio::test]
    async fn tools_call_delete_package_not_found_is_tool_error() {
        let (_file, app) = app_with_fixture();

        let body = mcp_json(
            &app,
            tool_call(
                14,
                "delete_package",
                serde_json::json!({"package_id": "PKG999"}),
            ),
        )
        .await;

        assert_eq!(result_text(&body), "Package PKG999 not found");
        assert_eq!(body["result"]["isError"], true);
    }

    #[tokio::test]
    async fn mcp_tools_call_unknown_tool_returns_tool_not_found_data() {
        let (_file, app) = app_with_fixture();

        let body = mcp_json(
            &app,
            tool_call(15, "unknown_tool", serde_json::json!({})),
        )
        .await;

        assert_eq!(body["error"]["code"], -32601);
        assert_eq!(body["error"]["data"]["code"], "tool_not_found");
    }

    #[tokio::test]
    async fn mcp_tools_call_malformed_params_returns_invalid_params() {
        let (_file, app) = app_with_fixture();

        let body = mcp_json(
            &app,
            r#"{"jsonrpc":"2.0","id":16,"method":"tools/call","params":{"name":"get_package_details","arguments":"not-an-object"}}"#.to_string(),
        )
        .await;

        assert_eq!(body["id"], 16);
        assert_eq!(body["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn mcp_resources_list_includes_fixed_uris() {
        let (_file, app) = app_with_fixture();

        let body = mcp_json(
            &app,
            r#"{"jsonrpc":"2.0","id":20,"method":"resources/list","params":{}}"#.to_string(),
        )
        .await;

        let resources = body["result"]["resources"]
            .as_array()
            .expect("resources array");
        assert_eq!(resources.len(), 3);
        assert_eq!(resources[0]["uri"], "resource://packages/snapshot");
        assert_eq!(resources[1]["uri"], "resource://packages/pending");
        assert_eq!(resources[2]["uri"], "resource://delivery-guys/roster");
    }

    #[tokio::test]
    async fn mcp_resources_read_snapshot_returns_all_packages() {
        let (_file, app) = app_with_fixture();

        let body = mcp_json(
            &app,
            r#"{"jsonrpc":"2.0","id":21,"method":"resources/read","params":{"uri":"resource://packages/snapshot"}}"#.to_string(),
        )
        .await;

        assert_eq!(
            body["result"]["contents"][0]["uri"],
            "resource://packages/snapshot"
        );
        let content_text = body["result"]["contents"][0]["text"]
            .as_str()
            .expect("text content");
        let content_json: serde_json::Value =
            serde_json::from_str(content_text).expect("valid resource json");
        assert_eq!(content_json["packages"].as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn mcp_resources_read_pending_filters_by_state() {
        let (_file, app) = app_with_fixture();

        let body = mcp_json(
            &app,
            r#"{"jsonrpc":"2.0","id":22,"method":"resources/read","params":{"uri":"resource://packages/pending"}}"#.to_string(),
        )
        .await;

        let content_text = body["result"]["contents"][0]["text"]
            .as_str()
            .expect("text content");
        let content_json: serde_json::Value =
            serde_json::from_str(content_text).expect("valid resource json");
        let pending = content_json["packages"].as_array().expect("packages array");
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0]["package_id"], "PKG001");
        assert_eq!(pending[1]["package_id"], "PKG003");
    }

    #[tokio::test]
    async fn mcp_resources_read_unknown_uri_returns_resource_not_found_data() {
        let (_file, app) = app_with_fixture();

        let body = mcp_json(
            &app,
            r#"{"jsonrpc":"2.0","id":23,"method":"resources/read","params":{"uri":"resource://unknown/item"}}"#.to_string(),
        )
        .await;

        assert_eq!(body["error"]["code"], -32601);
        assert_eq!(body["error"]["data"]["code"], "resource_not_found");
    }

    #[tokio::test]
    async fn mcp_notification_returns_no_content() {
        let (_file, app) = app_with_fixture();

        let (status, bytes) =
            mcp_response(&app, r#"{"jsonrpc":"2.0","method":"ping"}"#.to_string()).await;

        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn mcp_batch_mixed_requests_return_only_id_responses() {
        let (_file, app) = app_with_fixture();

        let body = mcp_json(
            &app,
            r#"[{"jsonrpc":"2.0","method":"ping"},{"jsonrpc":"2.0","id":100,"method":"ping"},{"jsonrpc":"2.0","id":200,"method":"tools/list","params":{}}]"#.to_string(),
        )
        .await;

        let responses = body.as_array().expect("batch response array");
        assert_eq!(responses.len(), 2);
        let ids: Vec<i64> = responses
            .iter()
            .filter_map(|item| item["id"].as_i64())
            .collect();
        assert!(ids.contains(&100));
        assert!(ids.contains(&200));
    }

    #[tokio::test]
    async fn mcp_parse_error_for_invalid_json() {
        let (_file, app) = app_with_fixture();

        let (status, bytes) = mcp_response(&app, "{".to_string()).await;

        assert_eq!(status, StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("valid json response");
        assert_eq!(body["error"]["code"], -32700);
    }
}

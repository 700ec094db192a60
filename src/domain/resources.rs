//! Model Context Protocol static resource providers
//!
//! Exposes read-only snapshots of the package store as file-like resources
//! under `resource://` URIs.

use rust_mcp_sdk::schema::{
    ReadResourceContent, ReadResourceRequestParams, ReadResourceResult, Resource,
    TextResourceContents,
};
use serde_json::{json, Value};

use crate::mcp::rpc::{
    app_error_to_json_rpc, json_rpc_error, json_rpc_error_with_data, json_rpc_result,
};
use crate::{errors::AppError, AppState};

pub const PACKAGES_RESOURCE_URI: &str = "resource://packages/snapshot";
pub const PENDING_PACKAGES_RESOURCE_URI: &str = "resource://packages/pending";
pub const DELIVERY_GUYS_RESOURCE_URI: &str = "resource://delivery-guys/roster";

pub fn build_resources_list() -> Vec<Resource> {
    vec![
        Resource {
            annotations: None,
            description: Some("All packages currently tracked by the post office".to_string()),
            icons: vec![],
            meta: None,
            mime_type: Some("application/json".to_string()),
            name: "Package Snapshot".to_string(),
            size: None,
            title: None,
            uri: PACKAGES_RESOURCE_URI.to_string(),
        },
        Resource {
            annotations: None,
            description: Some("Packages still waiting to go out for delivery".to_string()),
            icons: vec![],
            meta: None,
            mime_type: Some("application/json".to_string()),
            name: "Pending Package Snapshot".to_string(),
            size: None,
            title: None,
            uri: PENDING_PACKAGES_RESOURCE_URI.to_string(),
        },
        Resource {
            annotations: None,
            description: Some("Distinct delivery guys known to the package file".to_string()),
            icons: vec![],
            meta: None,
            mime_type: Some("application/json".to_string()),
            name: "Delivery Guy Roster".to_string(),
            size: None,
            title: None,
            uri: DELIVERY_GUYS_RESOURCE_URI.to_string(),
        },
    ]
}

fn resource_result(id: Option<Value>, uri: &str, payload: Value) -> Value {
    let result = serde_json::to_value(ReadResourceResult {
        contents: vec![ReadResourceContent::from(TextResourceContents {
            meta: None,
            mime_type: Some("application/json".to_string()),
            text: payload.to_string(),
            uri: uri.to_string(),
        })],
        meta: None,
    })
    .expect("read resource result serialization");

    json_rpc_result(id, result)
}

pub async fn handle_resources_read(
    state: &AppState,
    id: Option<Value>,
    params: Option<Value>,
) -> Value {
    let Some(raw_params) = params else {
        return json_rpc_error(id, -32602, "Invalid params");
    };

    let resource_read: ReadResourceRequestParams = match serde_json::from_value(raw_params) {
        Ok(value) => value,
        Err(_) => return json_rpc_error(id, -32602, "Invalid params"),
    };

    match resource_read.uri.as_str() {
        PACKAGES_RESOURCE_URI => {
            let store = state
                .store
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            resource_result(
                id,
                PACKAGES_RESOURCE_URI,
                json!({ "packages": store.packages() }),
            )
        }
        PENDING_PACKAGES_RESOURCE_URI => {
            let store = state
                .store
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let pending = store.packages_by_state("pending");
            resource_result(
                id,
                PENDING_PACKAGES_RESOURCE_URI,
                json!({ "packages": pending }),
            )
        }
        DELIVERY_GUYS_RESOURCE_URI => {
            let store = state
                .store
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            match store.all_delivery_guys() {
                Ok(delivery_guys) => resource_result(
                    id,
                    DELIVERY_GUYS_RESOURCE_URI,
                    json!({ "delivery_guys": delivery_guys }),
                ),
                Err(err) => app_error_to_json_rpc(id, AppError::internal(err.to_string())),
            }
        }
        _ => json_rpc_error_with_data(
            id,
            -32601,
            "Method not found",
            Some(json!({
                "code": "resource_not_found",
                "message": "unknown resource uri",
                "details": {
                    "uri": resource_read.uri,
                },
            })),
        ),
    }
}

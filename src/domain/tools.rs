//! Interactive tools exposed via Model Context Protocol
//!
//! Ten tools over the shared `PackageStore`: six read queries and four
//! mutations. Store failures never surface as JSON-RPC errors; they are
//! rendered as a human-readable sentence in the tool result text, matching
//! the report strings of the original post office server.

use std::collections::BTreeMap;
use std::sync::{MutexGuard, PoisonError};

use chrono::{SecondsFormat, Utc};
use rust_mcp_sdk::{
    macros,
    schema::{CallToolRequestParams, CallToolResult, ContentBlock, TextContent, Tool},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;

use crate::domain::reports;
use crate::mcp::rpc::{json_rpc_error, json_rpc_error_with_data, json_rpc_result};
use crate::store::{
    PackageStore, StoreError, DELIVERY_GUY_COLUMN, LABEL_COLUMN, PACKAGE_ID_COLUMN, STATE_COLUMN,
    WEIGHT_COLUMN,
};
use crate::AppState;

#[macros::mcp_tool(
    name = "get_packages_for_delivery_guy",
    description = "Get all packages assigned to a specific delivery guy"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct GetPackagesForDeliveryGuyTool {
    pub delivery_guy: i64,
}

#[macros::mcp_tool(
    name = "get_package_details",
    description = "Get detailed information for a specific package"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct GetPackageDetailsTool {
    pub package_id: String,
}

#[macros::mcp_tool(
    name = "get_delivery_guy_stats",
    description = "Get delivery statistics for a specific delivery guy"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct GetDeliveryGuyStatsTool {
    pub delivery_guy: i64,
}

#[macros::mcp_tool(
    name = "get_all_delivery_guys",
    description = "Get list of all delivery guys in the system"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct GetAllDeliveryGuysTool {}

#[macros::mcp_tool(
    name = "search_packages_by_label",
    description = "Search packages by label type (FRAGILE, STANDARD, URGENT)"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct SearchPackagesByLabelTool {
    pub label: String,
}

#[macros::mcp_tool(
    name = "get_packages_by_state",
    description = "Get all packages with a specific state (pending, delivered, in_transit)"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct GetPackagesByStateTool {
    pub state: String,
}

#[macros::mcp_tool(
    name = "update_package_state",
    description = "Update the state of a specific package"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct UpdatePackageStateTool {
    pub package_id: String,
    pub new_state: String,
}

#[macros::mcp_tool(
    name = "add_new_package",
    description = "Add a new package to the database"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct AddNewPackageTool {
    pub package_id: String,
    pub delivery_guy: i64,
    pub weight_kg: Option<f64>,
    pub size_cm: Option<String>,
    pub sender_name: Option<String>,
    pub sender_address: Option<String>,
    pub receiver_name: Option<String>,
    pub receiver_address: Option<String>,
    pub label: Option<String>,
    pub state: Option<String>,
}

#[macros::mcp_tool(
    name = "delete_package",
    description = "Delete a package from the database"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct DeletePackageTool {
    pub package_id: String,
}

#[macros::mcp_tool(
    name = "delete_packages",
    description = "Delete multiple packages from the database"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct DeletePackagesTool {
    pub package_ids: Vec<String>,
}

pub fn build_tools_list() -> Vec<Tool> {
    vec![
        GetPackagesForDeliveryGuyTool::tool(),
        GetPackageDetailsTool::tool(),
        GetDeliveryGuyStatsTool::tool(),
        GetAllDeliveryGuysTool::tool(),
        SearchPackagesByLabelTool::tool(),
        GetPackagesByStateTool::tool(),
        UpdatePackageStateTool::tool(),
        AddNewPackageTool::tool(),
        DeletePackageTool::tool(),
        DeletePackagesTool::tool(),
    ]
}

#[derive(Debug, Deserialize)]
pub struct DeliveryGuyParams {
    pub delivery_guy: i64,
}

#[derive(Debug, Deserialize)]
pub struct PackageIdParams {
    pub package_id: String,
}

#[derive(Debug, Deserialize)]
pub struct LabelParams {
    pub label: String,
}

#[derive(Debug, Deserialize)]
pub struct StateParams {
    pub state: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStateParams {
    pub package_id: String,
    pub new_state: String,
}

#[derive(Debug, Deserialize)]
pub struct PackageIdsParams {
    pub package_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewPackageParams {
    pub package_id: String,
    pub delivery_guy: i64,
    pub weight_kg: Option<f64>,
    pub size_cm: Option<String>,
    pub sender_name: Option<String>,
    pub sender_address: Option<String>,
    pub receiver_name: Option<String>,
    pub receiver_address: Option<String>,
    pub label: Option<String>,
    pub state: Option<String>,
}

impl NewPackageParams {
    /// Collapses the typed tool arguments into the store's column mapping,
    /// leaving out columns the caller did not provide.
    pub fn into_fields(self) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        fields.insert(PACKAGE_ID_COLUMN.to_string(), self.package_id);
        fields.insert(
            DELIVERY_GUY_COLUMN.to_string(),
            self.delivery_guy.to_string(),
        );
        if let Some(weight_kg) = self.weight_kg {
            fields.insert(WEIGHT_COLUMN.to_string(), weight_kg.to_string());
        }
        let text_columns = [
            ("size_cm", self.size_cm),
            ("sender_name", self.sender_name),
            ("sender_address", self.sender_address),
            ("receiver_name", self.receiver_name),
            ("receiver_address", self.receiver_address),
            (LABEL_COLUMN, self.label),
            (STATE_COLUMN, self.state),
        ];
        for (column, value) in text_columns {
            if let Some(value) = value {
                fields.insert(column.to_string(), value);
            }
        }
        fields
    }
}

fn parse_arguments<T: DeserializeOwned>(
    arguments: Option<Map<String, Value>>,
) -> Result<T, serde_json::Error> {
    serde_json::from_value(Value::Object(arguments.unwrap_or_default()))
}

fn lock_store(state: &AppState) -> MutexGuard<'_, PackageStore> {
    state.store.lock().unwrap_or_else(PoisonError::into_inner)
}

fn tool_text_result(
    id: Option<Value>,
    text: String,
    structured_content: Option<Map<String, Value>>,
) -> Value {
    build_tool_result(id, text, structured_content, false)
}

fn tool_failure_result(id: Option<Value>, text: String) -> Value {
    build_tool_result(id, text, None, true)
}

fn build_tool_result(
    id: Option<Value>,
    text: String,
    structured_content: Option<Map<String, Value>>,
    is_error: bool,
) -> Value {
    json_rpc_result(
        id,
        serde_json::to_value(CallToolResult {
            content: vec![ContentBlock::from(TextContent::new(text, None, None))],
            is_error: is_error.then_some(true),
            meta: None,
            structured_content,
        })
        .expect("tool result serialization"),
    )
}

/// Renders a store failure the way the tool boundary reports it: the
/// not-found sentence for missing packages, `Error: …` for everything else.
fn store_failure(id: Option<Value>, err: &StoreError) -> Value {
    let text = match err {
        StoreError::PackageNotFound { .. } => err.to_string(),
        _ => format!("Error: {err}"),
    };
    tool_failure_result(id, text)
}

fn generated_at_utc() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub async fn handle_tools_call(state: &AppState, id: Option<Value>, params: Option<Value>) -> Value {
    let Some(raw_params) = params else {
        return json_rpc_error(id, -32602, "Invalid params");
    };

    let tool_call: CallToolRequestParams = match serde_json::from_value(raw_params) {
        Ok(value) => value,
        Err(_) => return json_rpc_error(id, -32602, "Invalid params"),
    };

    match tool_call.name.as_str() {
        "get_packages_for_delivery_guy" => {
            let query: DeliveryGuyParams = match parse_arguments(tool_call.arguments) {
                Ok(value) => value,
                Err(_) => return json_rpc_error(id, -32602, "Invalid params"),
            };
            info!(
                delivery_guy = query.delivery_guy,
                "fetching packages for delivery guy"
            );

            let store = lock_store(state);
            match store.packages_for_delivery_guy(query.delivery_guy) {
                Ok(packages) if packages.is_empty() => tool_text_result(
                    id,
                    format!("No packages found for delivery guy {}", query.delivery_guy),
                    Some(Map::from_iter([
                        ("packages".to_string(), json!([])),
                        ("total".to_string(), json!(0)),
                        ("generated_at_utc".to_string(), json!(generated_at_utc())),
                    ])),
                ),
                Ok(packages) => {
                    let total = packages.len();
                    tool_text_result(
                        id,
                        reports::packages_for_delivery_guy_report(query.delivery_guy, &packages),
                        Some(Map::from_iter([
                            ("packages".to_string(), json!(packages)),
                            ("total".to_string(), json!(total)),
                            ("generated_at_utc".to_string(), json!(generated_at_utc())),
                        ])),
                    )
                }
                Err(err) => store_failure(id, &err),
            }
        }
        "get_package_details" => {
            let query: PackageIdParams = match parse_arguments(tool_call.arguments) {
                Ok(value) => value,
                Err(_) => return json_rpc_error(id, -32602, "Invalid params"),
            };
            info!(package_id = %query.package_id, "fetching package details");

            let store = lock_store(state);
            match store.package_details(&query.package_id) {
                Some(package) => tool_text_result(
                    id,
                    reports::package_details_report(package),
                    Some(Map::from_iter([(
                        "package".to_string(),
                        json!(package),
                    )])),
                ),
                None => tool_failure_result(
                    id,
                    format!("Package {} not found", query.package_id),
                ),
            }
        }
        "get_delivery_guy_stats" => {
            let query: DeliveryGuyParams = match parse_arguments(tool_call.arguments) {
                Ok(value) => value,
                Err(_) => return json_rpc_error(id, -32602, "Invalid params"),
            };
            info!(
                delivery_guy = query.delivery_guy,
                "fetching stats for delivery guy"
            );

            let store = lock_store(state);
            match store.delivery_guy_stats(query.delivery_guy) {
                Ok(stats) => tool_text_result(
                    id,
                    reports::delivery_guy_stats_report(&stats),
                    Some(Map::from_iter([
                        ("stats".to_string(), json!(stats)),
                        ("generated_at_utc".to_string(), json!(generated_at_utc())),
                    ])),
                ),
                Err(err) => store_failure(id, &err),
            }
        }
        "get_all_delivery_guys" => {
            info!("fetching list of all delivery guys");

            let store = lock_store(state);
            match store.all_delivery_guys() {
                Ok(delivery_guys) => tool_text_result(
                    id,
                    reports::all_delivery_guys_report(&delivery_guys),
                    Some(Map::from_iter([(
                        "delivery_guys".to_string(),
                        json!(delivery_guys),
                    )])),
                ),
                Err(err) => store_failure(id, &err),
            }
        }
        "search_packages_by_label" => {
            let query: LabelParams = match parse_arguments(tool_call.arguments) {
                Ok(value) => value,
                Err(_) => return json_rpc_error(id, -32602, "Invalid params"),
            };
            info!(label = %query.label, "searching packages by label");

            let store = lock_store(state);
            let packages = store.packages_by_label(&query.label);
            if packages.is_empty() {
                tool_text_result(
                    id,
                    format!("No packages found with label: {}", query.label),
                    Some(Map::from_iter([
                        ("packages".to_string(), json!([])),
                        ("total".to_string(), json!(0)),
                    ])),
                )
            } else {
                let total = packages.len();
                tool_text_result(
                    id,
                    reports::packages_by_label_report(&query.label, &packages),
                    Some(Map::from_iter([
                        ("packages".to_string(), json!(packages)),
                        ("total".to_string(), json!(total)),
                        ("generated_at_utc".to_string(), json!(generated_at_utc())),
                    ])),
                )
            }
        }
        "get_packages_by_state" => {
            let query: StateParams = match parse_arguments(tool_call.arguments) {
                Ok(value) => value,
                Err(_) => return json_rpc_error(id, -32602, "Invalid params"),
            };
            info!(package_state = %query.state, "fetching packages by state");

            let store = lock_store(state);
            let packages = store.packages_by_state(&query.state);
            if packages.is_empty() {
                tool_text_result(
                    id,
                    format!("No packages found with state: {}", query.state),
                    Some(Map::from_iter([
                        ("packages".to_string(), json!([])),
                        ("total".to_string(), json!(0)),
                    ])),
                )
            } else {
                let total = packages.len();
                tool_text_result(
                    id,
                    reports::packages_by_state_report(&query.state, &packages),
                    Some(Map::from_iter([
                        ("packages".to_string(), json!(packages)),
                        ("total".to_string(), json!(total)),
                        ("generated_at_utc".to_string(), json!(generated_at_utc())),
                    ])),
                )
            }
        }
        "update_package_state" => {
            let update: UpdateStateParams = match parse_arguments(tool_call.arguments) {
                Ok(value) => value,
                Err(_) => return json_rpc_error(id, -32602, "Invalid params"),
            };
            info!(
                package_id = %update.package_id,
                new_state = %update.new_state,
                "updating package state"
            );

            let mut store = lock_store(state);
            match store.update_state(&update.package_id, &update.new_state) {
                Ok(old_state) => tool_text_result(
                    id,
                    format!(
                        "Package {} state updated from {} to {}",
                        update.package_id, old_state, update.new_state
                    ),
                    Some(Map::from_iter([
                        ("package_id".to_string(), json!(update.package_id)),
                        ("old_state".to_string(), json!(old_state)),
                        ("new_state".to_string(), json!(update.new_state)),
                    ])),
                ),
                Err(err) => store_failure(id, &err),
            }
        }
        "add_new_package" => {
            let new_package: NewPackageParams = match parse_arguments(tool_call.arguments) {
                Ok(value) => value,
                Err(_) => return json_rpc_error(id, -32602, "Invalid params"),
            };
            let package_id = new_package.package_id.clone();
            info!(package_id = %package_id, "adding new package");

            let mut store = lock_store(state);
            match store.add_package(new_package.into_fields()) {
                Ok(()) => tool_text_result(
                    id,
                    format!("Package {package_id} added successfully"),
                    Some(Map::from_iter([(
                        "package_id".to_string(),
                        json!(package_id),
                    )])),
                ),
                Err(err) => store_failure(id, &err),
            }
        }
        "delete_package" => {
            let query: PackageIdParams = match parse_arguments(tool_call.arguments) {
                Ok(value) => value,
                Err(_) => return json_rpc_error(id, -32602, "Invalid params"),
            };
            info!(package_id = %query.package_id, "deleting package");

            let mut store = lock_store(state);
            match store.delete_package(&query.package_id) {
                Ok(()) => tool_text_result(
                    id,
                    format!("Package {} deleted successfully", query.package_id),
                    Some(Map::from_iter([(
                        "package_id".to_string(),
                        json!(query.package_id),
                    )])),
                ),
                Err(err) => store_failure(id, &err),
            }
        }
        "delete_packages" => {
            let query: PackageIdsParams = match parse_arguments(tool_call.arguments) {
                Ok(value) => value,
                Err(_) => return json_rpc_error(id, -32602, "Invalid params"),
            };
            info!(requested = query.package_ids.len(), "deleting packages");

            let mut store = lock_store(state);
            match store.delete_packages(&query.package_ids) {
                Ok(deleted) => tool_text_result(
                    id,
                    format!("Deleted {deleted} packages successfully"),
                    Some(Map::from_iter([
                        ("deleted".to_string(), json!(deleted)),
                        ("requested".to_string(), json!(query.package_ids.len())),
                    ])),
                ),
                Err(err) => store_failure(id, &err),
            }
        }
        _ => json_rpc_error_with_data(
            id,
            -32601,
            "Method not found",
            Some(json!({
                "code": "tool_not_found",
                "message": "unknown tool name",
                "details": {
                    "name": tool_call.name,
                },
            })),
        ),
    }
}

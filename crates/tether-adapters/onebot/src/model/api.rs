//! Responses to capability-query actions.
//!
//! Peers probe the bridge with `get_*` actions before they start sending
//! replies. Each supported query is answered with a fixed payload.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A OneBot v11 action response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    /// Response payload.
    pub data: Value,
    /// Echo token copied from the request.
    #[serde(default)]
    pub echo: Value,
    #[serde(default)]
    pub message: String,
    /// Return code (0 for success).
    pub retcode: i32,
    /// "ok", "async" or "failed".
    pub status: String,
    /// Extra top-level fields some actions carry.
    #[serde(flatten, default)]
    pub extra: serde_json::Map<String, Value>,
}

impl ApiResponse {
    /// A successful response carrying `data`.
    pub fn ok(data: Value, echo: &Value) -> Self {
        Self {
            data,
            echo: echo.clone(),
            message: String::new(),
            retcode: 0,
            status: "ok".into(),
            extra: serde_json::Map::new(),
        }
    }

    /// Checks if the response reports success.
    pub fn is_ok(&self) -> bool {
        self.status == "ok" && self.retcode == 0
    }
}

/// Actions answered by [`canned_response`].
pub const QUERY_ACTIONS: &[&str] = &[
    "get_group_list",
    "get_login_info",
    "get_guild_service_profile",
    "get_online_clients",
    "get_version_info",
    "get_friend_list",
    "get_guild_list",
    "get_guild_channel_list",
];

/// Builds the response for a capability query, or `None` when the action
/// is not supported.
pub fn canned_response(action: &str, echo: &Value, self_id: i64) -> Option<ApiResponse> {
    let data = match action {
        "get_group_list" => json!([{
            "group_create_time": "0",
            "group_id": "868858989",
            "group_level": "0",
            "group_memo": "",
            "group_name": "可爱red",
            "max_member_count": "3000",
            "member_count": "1800",
        }]),
        "get_login_info" => json!({"nickname": "早苗", "user_id": self_id}),
        "get_guild_service_profile" => json!({"nickname": "", "tiny_id": 0}),
        "get_online_clients" => {
            let mut response = ApiResponse::ok(json!({"clients": [], "tiny_id": 0}), echo);
            response.extra.insert("clients".into(), json!([]));
            return Some(response);
        }
        "get_version_info" => json!({
            "app_full_name": "go-cqhttp-v1.0.0_windows_amd64-go1.20.2",
            "app_name": "go-cqhttp",
            "app_version": "v1.0.0",
            "coolq_directory": "",
            "coolq_edition": "pro",
            "go-cqhttp": true,
            "plugin_build_configuration": "release",
            "plugin_build_number": 99,
            "plugin_version": "4.15.0",
            "protocol_name": 4,
            "protocol_version": "v11",
            "runtime_os": "windows",
            "runtime_version": "go1.20.2",
            "version": "v1.0.0",
        }),
        "get_friend_list" => json!([{
            "nickname": "小狐狸",
            "remark": "",
            "user_id": "2022717137",
        }]),
        "get_guild_list" => json!([{
            "guild_id": "0",
            "guild_name": "868858989",
            "guild_display_id": "868858989",
        }]),
        "get_guild_channel_list" => json!([]),
        _ => return None,
    };
    Some(ApiResponse::ok(data, echo))
}

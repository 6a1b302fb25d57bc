//! REST routes: advisory pre-join check and online-user listing.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use huddle_core::{JoinError, UserRecord};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::server::AppState;

/// Body of `POST /api/users/join`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinCheckRequest {
    /// Requested display name, untrimmed.
    #[serde(default, alias = "username")]
    pub display_name: Option<String>,
}

/// Body of `GET /api/users/online`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OnlineUsersResponse {
    /// Online users in join order.
    pub users: Vec<UserRecord>,
}

fn failure(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(json!({ "success": false, "error": error.into() }))).into_response()
}

/// POST /api/users/join
///
/// Reports whether a name could join right now. Never reserves it; the
/// authoritative check happens when the channel `join` event arrives.
pub async fn check_join(
    State(state): State<AppState>,
    body: Result<Json<JoinCheckRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => return failure(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    let raw = request.display_name.unwrap_or_default();

    match state.engine.registry().check_available(&raw) {
        Ok(name) => {
            debug!(display_name = %name, "display name available");
            let message = format!("Display name '{name}' is available");
            Json(json!({ "success": true, "displayName": name, "message": message }))
                .into_response()
        }
        Err(JoinError::NameConflict { name }) => {
            debug!(display_name = %name, "display name taken");
            failure(StatusCode::CONFLICT, "Display name is already taken")
        }
        Err(_) => failure(StatusCode::BAD_REQUEST, "Display name is required"),
    }
}

/// GET /api/users/online
pub async fn online_users(State(state): State<AppState>) -> Json<OnlineUsersResponse> {
    Json(OnlineUsersResponse {
        users: state.engine.online_users(),
    })
}

use axum::{Json, extract::State};
use tracing::error;

use parley_types::api::{CreateUsernameRequest, CreateUsernameResponse, SearchUsersRequest};
use parley_types::models::User;

use crate::AppState;
use crate::error::ApiError;
use crate::guard::require_user;

/// Case-insensitive username substring search, never including the caller.
pub async fn search_users(
    State(state): State<AppState>,
    Json(req): Json<SearchUsersRequest>,
) -> Result<Json<Vec<User>>, ApiError> {
    let user = require_user(&req.session)?;
    let caller_id = user.id;

    let db_state = state.clone();
    let users =
        tokio::task::spawn_blocking(move || db_state.db.search_users(&req.username, caller_id))
            .await
            .map_err(ApiError::from_join)?
            .map_err(ApiError::from_store)?;

    Ok(Json(users))
}

/// The one soft-failure mutation: it never raises. Every outcome — missing
/// session, name taken, store trouble — comes back as a result object the
/// caller can inspect.
pub async fn create_username(
    State(state): State<AppState>,
    Json(req): Json<CreateUsernameRequest>,
) -> Json<CreateUsernameResponse> {
    let CreateUsernameRequest { username, session } = req;

    let Some(user) = session.user else {
        return Json(CreateUsernameResponse::error("Not authorized"));
    };
    let user_id = user.id;

    let db_state = state.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        if db_state.db.find_user_by_username(&username)?.is_some() {
            return Ok(CreateUsernameResponse::error("User already exists"));
        }
        db_state.db.set_username(user_id, &username)?;
        Ok::<_, anyhow::Error>(CreateUsernameResponse::ok())
    })
    .await;

    let response = match outcome {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => {
            error!("createUsername error: {err:#}");
            CreateUsernameResponse::error("createUsername error")
        }
        Err(err) => {
            error!("blocking task join error: {err}");
            CreateUsernameResponse::error("createUsername error")
        }
    };

    Json(response)
}

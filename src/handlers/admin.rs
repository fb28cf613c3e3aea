use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::Appointment;
use crate::state::AppState;

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    if token != state.config.admin_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

pub async fn get_appointments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Appointment>>, AppError> {
    require_admin(&state, &headers)?;

    let appointments = {
        let db = state.db.lock().unwrap();
        queries::list_appointments(&db).map_err(AppError::Internal)?
    };

    Ok(Json(appointments))
}

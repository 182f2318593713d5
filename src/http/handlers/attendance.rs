use crate::auth::{admit, AuthenticatedUser, Role};
use crate::error::HandlerErr;
use crate::http::types::AppState;
use crate::reconcile::{reconcile, Outcome, ReconcileInput};
use crate::views::{build_roster, build_self_view, DateRange};
use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::{error, info};

const ROSTER_ROLES: &[Role] = &[Role::Teacher, Role::Admin];
const SELF_ROLES: &[Role] = &[Role::Student];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

fn guard(
    state: &AppState,
    headers: &HeaderMap,
    allowed: &[Role],
) -> Result<AuthenticatedUser, HandlerErr> {
    let credential = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    admit(&state.keys, credential, allowed)
}

fn log_store_failure(e: HandlerErr) -> HandlerErr {
    if e.status() == StatusCode::INTERNAL_SERVER_ERROR {
        error!(code = e.code, message = %e.message, "store failure");
    }
    e
}

pub async fn post_attendance(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, HandlerErr> {
    let user = guard(&state, &headers, ROSTER_ROLES)?;
    let body = body.map_err(|e| HandlerErr::bad_json(e.body_text()))?;
    let body: serde_json::Value =
        serde_json::from_slice(&body).map_err(|e| HandlerErr::bad_json(e.to_string()))?;
    let input = ReconcileInput::from_json(&body)?;

    let reconciled = state
        .with_store(move |conn| reconcile(conn, &input))
        .await
        .map_err(log_store_failure)?;

    let status = match reconciled.outcome {
        Outcome::Created => StatusCode::CREATED,
        Outcome::Updated => StatusCode::OK,
    };
    info!(
        user_id = %user.id,
        session_id = %reconciled.session.id,
        status = status.as_u16(),
        "attendance submitted"
    );
    Ok((status, Json(reconciled.session)).into_response())
}

pub async fn get_attendance(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<RosterQuery>, QueryRejection>,
) -> Result<Response, HandlerErr> {
    let user = guard(&state, &headers, ROSTER_ROLES)?;
    let Query(query) = query.map_err(|e| HandlerErr::bad_params(e.body_text()))?;
    let range = DateRange::parse(query.start_date.as_deref(), query.end_date.as_deref())?;

    let views = state
        .with_store(move |conn| build_roster(conn, &user, &range))
        .await
        .map_err(log_store_failure)?;

    Ok(Json(views).into_response())
}

pub async fn get_my_attendance(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, HandlerErr> {
    let user = guard(&state, &headers, SELF_ROLES)?;

    let views = state
        .with_store(move |conn| build_self_view(conn, &user.id))
        .await
        .map_err(log_store_failure)?;

    Ok(Json(views).into_response())
}

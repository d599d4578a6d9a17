use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;

use crate::{
    channel, error::Error, relay::Delivery, utils::event::ActionRequest, AppState,
};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    Core(Error),
    BadBody(JsonRejection),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Core(Error::InvalidArgument(message)) => {
                (StatusCode::BAD_REQUEST, message.to_owned())
            }
            ApiError::BadBody(rejection) => (rejection.status(), rejection.body_text()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::Core(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadBody(rejection)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat_action))
        .route("/stats", get(stats))
        .with_state(state)
}

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct ActionResponse {
    pub success: bool,
    pub delivery: Delivery,
}

pub async fn chat_action(
    State(state): State<AppState>,
    body: Result<Json<ActionRequest>, JsonRejection>,
) -> ApiResult<Json<ActionResponse>> {
    let Json(request) = body?;
    let delivery = channel::handle_request(&state.relay, request)?;
    Ok(Json(ActionResponse {
        success: true,
        delivery,
    }))
}

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct StatsResponse {
    pub waiting: usize,
    pub sessions: usize,
    pub connections: usize,
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let table = state.relay.table().stats();
    Json(StatsResponse {
        waiting: table.waiting,
        sessions: table.sessions,
        connections: state.hub().connection_count(),
    })
}

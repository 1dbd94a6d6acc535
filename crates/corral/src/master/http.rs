//! Operator-facing HTTP endpoints. Handlers stay `Send` by owning only a
//! channel into the reactor; the reservation pipeline itself runs there.

use std::str::FromStr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;

use crate::AgentId;
use crate::auth::CredentialStore;
use crate::master::agent::ReservationOp;
use crate::master::reservation::{ReservationError, ReservationRequest};
use crate::resources::{Resource, ResourceSet};

/// A reservation request on its way into the reactor, paired with the
/// one-shot channel the HTTP handler waits on.
pub enum OperatorMessage {
    Reservation {
        op: ReservationOp,
        request: ReservationRequest,
        response: oneshot::Sender<Result<(), ReservationError>>,
    },
}

#[derive(Clone)]
pub struct HttpState {
    credentials: Arc<CredentialStore>,
    operations: UnboundedSender<OperatorMessage>,
}

impl HttpState {
    pub fn new(
        credentials: Arc<CredentialStore>,
        operations: UnboundedSender<OperatorMessage>,
    ) -> Self {
        HttpState {
            credentials,
            operations,
        }
    }
}

pub fn make_router(state: HttpState) -> Router {
    Router::new()
        .route("/reserve", post(reserve_handler))
        .route("/unreserve", post(unreserve_handler))
        .with_state(state)
}

async fn reserve_handler(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    handle_reservation(state, ReservationOp::Reserve, headers, body).await
}

async fn unreserve_handler(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    handle_reservation(state, ReservationOp::Unreserve, headers, body).await
}

/* Body shape: slaveId=<id>&resources=<JSON array of tagged resources> */
#[derive(Deserialize)]
struct ReservationForm {
    #[serde(rename = "slaveId")]
    slave_id: Option<String>,
    resources: Option<String>,
}

async fn handle_reservation(
    state: HttpState,
    op: ReservationOp,
    headers: HeaderMap,
    body: String,
) -> Response {
    // Authentication comes first; the body is not parsed for an
    // unauthenticated caller
    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let principal = match state.credentials.authenticate(authorization) {
        Ok(principal) => principal,
        Err(message) => {
            return error_response(ReservationError::Unauthenticated(message));
        }
    };

    let request = match parse_reservation_body(principal, &body) {
        Ok(request) => request,
        Err(message) => return error_response(ReservationError::MalformedRequest(message)),
    };

    let (response_sender, response_receiver) = oneshot::channel();
    let message = OperatorMessage::Reservation {
        op,
        request,
        response: response_sender,
    };
    if state.operations.send(message).is_err() {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    match response_receiver.await {
        Ok(Ok(())) => StatusCode::OK.into_response(),
        Ok(Err(error)) => error_response(error),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

fn parse_reservation_body(principal: String, body: &str) -> Result<ReservationRequest, String> {
    let form: ReservationForm =
        serde_urlencoded::from_str(body).map_err(|e| format!("invalid request body: {e}"))?;
    let slave_id = form
        .slave_id
        .ok_or_else(|| "missing 'slaveId' field".to_string())?;
    let agent_id =
        AgentId::from_str(&slave_id).map_err(|_| format!("invalid agent id {slave_id:?}"))?;
    let resources = form
        .resources
        .ok_or_else(|| "missing 'resources' field".to_string())?;
    let resources: Vec<Resource> = serde_json::from_str(&resources)
        .map_err(|e| format!("invalid 'resources' field: {e}"))?;
    let resources =
        ResourceSet::from_resources(resources).map_err(|e| format!("invalid resources: {e}"))?;
    Ok(ReservationRequest {
        principal,
        agent_id,
        resources,
    })
}

fn error_response(error: ReservationError) -> Response {
    match error {
        ReservationError::Unauthenticated(message) => (
            StatusCode::UNAUTHORIZED,
            [(WWW_AUTHENTICATE, "Basic realm=\"corral\"")],
            message,
        )
            .into_response(),
        ReservationError::Unauthorized(message) => {
            (StatusCode::FORBIDDEN, message).into_response()
        }
        ReservationError::MalformedRequest(message) => {
            (StatusCode::BAD_REQUEST, message).into_response()
        }
        error @ ReservationError::InsufficientResources { .. } => {
            (StatusCode::CONFLICT, error.to_string()).into_response()
        }
        ReservationError::OperationAborted => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

//! Domain directory handlers: listing, operations, and child resolution.

use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::header::{CONTENT_TYPE, HOST, LOCATION};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Form;
use tracing::{debug, error};

use super::AppState;
use crate::render::{ContentMode, ContentRenderer, Rendered};
use crate::service::{canonical_url, ErrorKind, OperationError, OperationRequest, Resolved};

/// HTTP status for each failure kind.
#[must_use]
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidConfig
        | ErrorKind::UnknownOperation
        | ErrorKind::MissingField
        | ErrorKind::MalformedRequest => StatusCode::BAD_REQUEST,
        ErrorKind::CreationFailed | ErrorKind::RestoreFailed => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Overloaded | ErrorKind::Cancelled | ErrorKind::ShuttingDown => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ErrorKind::RestoreTimedOut => StatusCode::GATEWAY_TIMEOUT,
    }
}

/// `GET` on the directory: the domain listing.
pub async fn list_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let renderer = renderer(&state, &headers);
    let url = directory_url(&state, &headers);
    respond(StatusCode::OK, renderer.directory(&state.directory, &url))
}

/// `POST` on the directory: runs the operation named by `op`.
pub async fn perform_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
    request: Request,
) -> Response {
    let renderer = renderer(&state, &headers);
    if !state.shutdown.is_accepting() {
        return failure(renderer, &OperationError::ShuttingDown);
    }
    let _guard = state.shutdown.in_flight_guard();

    let mut fields = OperationRequest::new(query);
    match body_fields(&state, &headers, request).await {
        Ok(body) => fields.extend(body),
        Err(err) => return failure(renderer, &err),
    }

    let url = directory_url(&state, &headers);
    match state.directory.perform(&fields, &url).await {
        Ok(outcome) => {
            let mut response = respond(StatusCode::CREATED, renderer.outcome(&outcome));
            match HeaderValue::from_str(outcome.location()) {
                Ok(location) => {
                    response.headers_mut().insert(LOCATION, location);
                }
                Err(err) => error!(location = outcome.location(), error = %err, "unusable Location"),
            }
            response
        }
        Err(err) => failure(renderer, &err),
    }
}

/// `GET` on `{directory}/{segment}`: a static child or a live domain.
pub async fn child_handler(
    State(state): State<AppState>,
    Path(segment): Path<String>,
    headers: HeaderMap,
) -> Response {
    let renderer = renderer(&state, &headers);
    match state.directory.resolve(&segment) {
        Ok(Resolved::Static(node)) => {
            let url = canonical_url(&directory_url(&state, &headers), node.segment());
            respond(StatusCode::OK, renderer.static_node(&node, &url))
        }
        Ok(Resolved::Domain(domain)) => respond(StatusCode::OK, renderer.domain(&domain)),
        Err(err) => failure(renderer, &err),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn renderer(state: &AppState, headers: &HeaderMap) -> ContentRenderer {
    ContentRenderer::new(ContentMode::from_structured(
        state.negotiator.use_structured(headers),
    ))
}

/// `{scheme}://{Host}{directory}`, or just the directory path without a
/// usable `Host` header.
fn directory_url(state: &AppState, headers: &HeaderMap) -> String {
    let path = state.config.directory_route();
    match headers.get(HOST).and_then(|h| h.to_str().ok()) {
        Some(host) if !host.is_empty() => format!("{}://{host}{path}", state.config.scheme()),
        _ if path.is_empty() => "/".to_string(),
        _ => path,
    }
}

fn respond(status: StatusCode, rendered: Rendered) -> Response {
    (status, [(CONTENT_TYPE, rendered.content_type)], rendered.body).into_response()
}

fn failure(renderer: ContentRenderer, err: &OperationError) -> Response {
    debug!(kind = err.kind().as_str(), error = %err, "directory request failed");
    respond(status_for(err.kind()), renderer.failure(err))
}

fn malformed(err: impl std::fmt::Display) -> OperationError {
    OperationError::MalformedRequest {
        message: err.to_string(),
    }
}

/// Fields from a urlencoded or multipart body. A request without a
/// `Content-Type` carries no body fields.
async fn body_fields(
    state: &AppState,
    headers: &HeaderMap,
    request: Request,
) -> Result<Vec<(String, String)>, OperationError> {
    let Some(content_type) = headers.get(CONTENT_TYPE) else {
        return Ok(Vec::new());
    };
    let content_type = content_type.to_str().map_err(malformed)?.to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(request, state).await.map_err(malformed)?;
        let mut fields = Vec::new();
        while let Some(field) = multipart.next_field().await.map_err(malformed)? {
            let Some(name) = field.name().map(ToString::to_string) else {
                continue;
            };
            let bytes = field.bytes().await.map_err(malformed)?;
            let value = String::from_utf8(bytes.to_vec())
                .map_err(|_| OperationError::missing_field(&name, "must be UTF-8 text"))?;
            fields.push((name, value));
        }
        Ok(fields)
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(fields) = Form::<Vec<(String, String)>>::from_request(request, state)
            .await
            .map_err(malformed)?;
        Ok(fields)
    } else {
        Err(OperationError::MalformedRequest {
            message: format!("unsupported content type {content_type}"),
        })
    }
}

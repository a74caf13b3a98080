use crate::models::{Card, CardCreatedResponse, CardFilter, CardPatch};
use crate::service::{CardError, CardService};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use common::AppState;
use serde_json::json;
use std::sync::Arc;

pub const CARDS_PREFIX: &str = "/api/v1/tarjeta";

impl IntoResponse for CardError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            CardError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            CardError::InvalidPayload { status, detail } => (status, detail),
            CardError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            // already logged with the store error where it happened
            CardError::CreateFailed => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An error occurred while creating document".to_string(),
            ),
            CardError::Infrastructure(msg) => {
                tracing::error!("Infrastructure error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "detail": msg }))).into_response()
    }
}

impl From<JsonRejection> for CardError {
    fn from(rejection: JsonRejection) -> Self {
        CardError::InvalidPayload {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for CardError {
    fn from(rejection: QueryRejection) -> Self {
        CardError::InvalidPayload {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl From<PathRejection> for CardError {
    fn from(rejection: PathRejection) -> Self {
        CardError::InvalidPayload {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

pub fn cards_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route(CARDS_PREFIX, get(list_cards).post(create_card))
        .route(&format!("{CARDS_PREFIX}/"), get(list_cards).post(create_card))
        .route(
            &format!("{CARDS_PREFIX}/{{doc_id}}"),
            get(get_card)
                .put(replace_card)
                .patch(patch_card)
                .delete(delete_card),
        )
        .fallback(route_not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .with_state(state)
}

async fn route_not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "detail": "Not Found" }))).into_response()
}

async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "detail": "Method Not Allowed" })),
    )
        .into_response()
}

/// Builds the list filter from raw query pairs. A repeated parameter
/// resolves to its last value.
fn list_filter(pairs: Vec<(String, String)>) -> CardFilter {
    let mut filter = CardFilter::default();
    for (key, value) in pairs {
        match key.as_str() {
            "status_filter" => filter.status = Some(value),
            "telefono_filter" => filter.phone = Some(value),
            _ => {}
        }
    }
    filter
}

async fn list_cards(
    State(state): State<Arc<AppState>>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<Json<Vec<Card>>, CardError> {
    let Query(pairs) = query?;
    let filter = list_filter(pairs);
    let cards = CardService::list_cards(state.db.as_ref(), filter).await?;
    Ok(Json(cards))
}

async fn get_card(
    State(state): State<Arc<AppState>>,
    doc_id: Result<Path<String>, PathRejection>,
) -> Result<Json<Card>, CardError> {
    let Path(doc_id) = doc_id?;
    let card = CardService::get_card(state.db.as_ref(), &doc_id).await?;
    Ok(Json(card))
}

async fn create_card(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Card>, JsonRejection>,
) -> Result<CardCreatedResponse, CardError> {
    let Json(card) = payload?;
    CardService::create_card(state.db.as_ref(), card).await
}

async fn replace_card(
    State(state): State<Arc<AppState>>,
    doc_id: Result<Path<String>, PathRejection>,
    payload: Result<Json<Card>, JsonRejection>,
) -> Result<Json<Card>, CardError> {
    let Path(doc_id) = doc_id?;
    let Json(card) = payload?;
    let updated = CardService::replace_card(state.db.as_ref(), &doc_id, card).await?;
    Ok(Json(updated))
}

async fn patch_card(
    State(state): State<Arc<AppState>>,
    doc_id: Result<Path<String>, PathRejection>,
    payload: Result<Json<CardPatch>, JsonRejection>,
) -> Result<Json<Card>, CardError> {
    let Path(doc_id) = doc_id?;
    let Json(patch) = payload?;
    let updated = CardService::patch_card(state.db.as_ref(), &doc_id, patch).await?;
    Ok(Json(updated))
}

async fn delete_card(
    State(state): State<Arc<AppState>>,
    doc_id: Result<Path<String>, PathRejection>,
) -> Result<impl IntoResponse, CardError> {
    let Path(doc_id) = doc_id?;
    CardService::delete_card(state.db.as_ref(), &doc_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use database::MemoryStore;
    use serde_json::Value;
    use tower::ServiceExt;

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState { db: Arc::new(MemoryStore::new()) })
    }

    fn app(state: &Arc<AppState>) -> Router {
        cards_router(state.clone()).with_state(state.clone())
    }

    fn ana() -> Value {
        json!({
            "name": "Ana",
            "points": 10,
            "phone": "555",
            "status": "active",
            "created_at": "2024-01-15T10:30:00Z",
        })
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn create(state: &Arc<AppState>, card: Value) -> String {
        let (status, body) = send(app(state), "POST", "/api/v1/tarjeta/", Some(card)).await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let state = test_state();

        let (status, body) = send(app(&state), "POST", "/api/v1/tarjeta/", Some(ana())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "Document created successfully");
        let id = body["id"].as_str().unwrap();
        assert!(!id.is_empty());

        let (status, body) = send(app(&state), "GET", &format!("/api/v1/tarjeta/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, ana());
    }

    #[tokio::test]
    async fn test_list_without_trailing_slash() {
        let state = test_state();
        create(&state, ana()).await;

        let (status, body) = send(app(&state), "GET", "/api/v1/tarjeta", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([ana()]));
    }

    #[tokio::test]
    async fn test_list_empty_is_not_found() {
        let state = test_state();

        let (status, body) = send(app(&state), "GET", "/api/v1/tarjeta/", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "detail": "Cards not found" }));
    }

    #[tokio::test]
    async fn test_list_with_filters() {
        let state = test_state();
        create(&state, ana()).await;
        let mut other = ana();
        other["status"] = json!("inactive");
        create(&state, other).await;

        let (status, body) = send(
            app(&state),
            "GET",
            "/api/v1/tarjeta/?status_filter=active&telefono_filter=555",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([ana()]));

        let (status, _) = send(app(&state), "GET", "/api/v1/tarjeta/?telefono_filter=999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let state = test_state();
        let uri = "/api/v1/tarjeta/does-not-exist";

        let (status, body) = send(app(&state), "GET", uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Card not found");

        let (status, _) = send(app(&state), "PUT", uri, Some(ana())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(app(&state), "PATCH", uri, Some(json!({ "points": 1 }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Document not found");

        let (status, _) = send(app(&state), "DELETE", uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_put_replaces_card() {
        let state = test_state();
        let id = create(&state, ana()).await;
        let uri = format!("/api/v1/tarjeta/{id}");

        let replacement = json!({
            "name": "Ana Maria",
            "points": 300,
            "phone": "556",
            "status": "gold",
            "created_at": "2025-02-01T12:00:00Z",
        });
        let (status, body) = send(app(&state), "PUT", &uri, Some(replacement.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, replacement);

        let (_, body) = send(app(&state), "GET", &uri, None).await;
        assert_eq!(body, replacement);
    }

    #[tokio::test]
    async fn test_patch_merges_fields() {
        let state = test_state();
        let id = create(&state, ana()).await;
        let uri = format!("/api/v1/tarjeta/{id}");

        let (status, body) = send(app(&state), "PATCH", &uri, Some(json!({ "points": 20 }))).await;
        assert_eq!(status, StatusCode::OK);

        let mut expected = ana();
        expected["points"] = json!(20);
        assert_eq!(body, expected);
    }

    #[tokio::test]
    async fn test_empty_patch_is_bad_request() {
        let state = test_state();
        let id = create(&state, ana()).await;

        let (status, body) = send(
            app(&state),
            "PATCH",
            &format!("/api/v1/tarjeta/{id}"),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "No fields provided for update");

        let (status, _) = send(app(&state), "PATCH", "/api/v1/tarjeta/missing", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_returns_no_content() {
        let state = test_state();
        let id = create(&state, ana()).await;
        let uri = format!("/api/v1/tarjeta/{id}");

        let (status, body) = send(app(&state), "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);

        let (status, _) = send(app(&state), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_incomplete_card_is_rejected_with_detail() {
        let state = test_state();
        let mut card = ana();
        card.as_object_mut().unwrap().remove("phone");

        let (status, body) = send(app(&state), "POST", "/api/v1/tarjeta/", Some(card)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].as_str().unwrap().contains("phone"));
    }

    #[tokio::test]
    async fn test_store_failure_on_create_hides_details() {
        let state = test_state();
        state.db.close().await;

        let (status, body) = send(app(&state), "POST", "/api/v1/tarjeta/", Some(ana())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "detail": "An error occurred while creating document" }));
    }

    #[tokio::test]
    async fn test_repeated_filter_uses_last_value() {
        let state = test_state();
        create(&state, ana()).await;

        let (status, body) = send(
            app(&state),
            "GET",
            "/api/v1/tarjeta/?status_filter=gold&status_filter=active",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([ana()]));
    }

    #[tokio::test]
    async fn test_invalid_path_is_rejected_with_detail() {
        let state = test_state();

        let (status, body) = send(app(&state), "GET", "/api/v1/tarjeta/%FF", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].is_string());
    }

    #[tokio::test]
    async fn test_unsupported_method_has_detail() {
        let state = test_state();

        let (status, body) = send(app(&state), "POST", "/api/v1/tarjeta/abc", Some(ana())).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body, json!({ "detail": "Method Not Allowed" }));
    }

    #[tokio::test]
    async fn test_unknown_route_has_detail() {
        let state = test_state();

        let (status, body) = send(app(&state), "GET", "/api/v1/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "detail": "Not Found" }));
    }

    #[tokio::test]
    async fn test_naive_timestamp_is_stored_as_utc() {
        let state = test_state();
        let mut card = ana();
        card["created_at"] = json!("2024-01-15T10:30:00");

        let id = create(&state, card).await;

        let (status, body) = send(app(&state), "GET", &format!("/api/v1/tarjeta/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, ana());
    }

    #[test]
    fn test_list_filter_ignores_unknown_parameters() {
        let filter = list_filter(vec![
            ("telefono_filter".into(), "555".into()),
            ("page".into(), "2".into()),
        ]);
        assert_eq!(filter, CardFilter { status: None, phone: Some("555".into()) });
    }
}

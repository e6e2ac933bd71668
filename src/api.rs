use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::Deserialize;

use crate::errors::ValidationError;
use crate::store::{CardChanges, CardPlacement, DbHandle};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
}

#[derive(Deserialize)]
pub struct InviteRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct CreateBoardRequest {
    pub title: String,
    pub description: Option<String>,
    pub owner_id: i64,
}

#[derive(Deserialize)]
pub struct CreateCardRequest {
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateCardRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub script: Option<String>,
    pub column_id: Option<i64>,
    pub order: Option<i64>,
}

#[derive(Deserialize)]
pub struct MoveCardRequest {
    pub column_id: i64,
    pub order: i64,
}

#[derive(Deserialize)]
pub struct ReorderRequest {
    pub updates: Vec<CardPlacement>,
}

#[derive(serde::Serialize)]
pub struct InviteResult {
    pub message: String,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/users/current", get(current_user))
        .route("/api/users/invite", post(invite_user))
        .route("/api/boards", get(list_boards).post(create_board))
        .route("/api/boards/{id}", get(get_board))
        .route("/api/boards/{id}/view", get(get_board_view))
        .route("/api/boards/{id}/members", get(list_board_members))
        .route("/api/columns/{id}/cards", post(create_card))
        .route(
            "/api/cards/{id}",
            get(get_card).patch(update_card).delete(delete_card),
        )
        .route("/api/cards/{id}/move", patch(move_card))
        .route("/api/cards/reorder", post(reorder_cards))
        .route("/health", get(health_check))
}

// ── Validation helpers ────────────────────────────────────────────────

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required { field });
    }
    Ok(())
}

fn require_email(email: &str) -> Result<(), ValidationError> {
    require("email", email)?;
    if !email.contains('@') {
        return Err(ValidationError::InvalidEmail {
            email: email.to_string(),
        });
    }
    Ok(())
}

/// Derive a display name from the local part of an email address:
/// "jane.doe@example.com" becomes "Jane Doe".
fn name_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or(email);
    local
        .split('.')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn list_users(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let users = state
        .db
        .call(|db| db.list_users())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(users))
}

/// Account setup. Creating with an email that already exists returns the
/// existing record instead of failing.
async fn create_user(
    State(state): State<SharedState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require("name", &req.name)?;
    require_email(&req.email)?;

    let name = req.name;
    let email = req.email;
    let (user, created) = state
        .db
        .call(move |db| {
            if let Some(existing) = db.get_user_by_email(&email)? {
                return Ok((existing, false));
            }
            Ok((db.create_user(&email, &name)?, true))
        })
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(user)))
}

async fn current_user(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .call(|db| db.first_user())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("No user records exist yet".to_string()))?;
    Ok(Json(user))
}

/// Team invitation. An existing address is a quiet success; a new one gets
/// a user record with a name derived from the email local part.
async fn invite_user(
    State(state): State<SharedState>,
    Json(req): Json<InviteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_email(&req.email)?;

    let email = req.email;
    let message = state
        .db
        .call(move |db| {
            if db.get_user_by_email(&email)?.is_some() {
                return Ok("User already exists and can be added to boards".to_string());
            }
            let name = name_from_email(&email);
            db.create_user(&email, &name)?;
            Ok(format!("Invitation sent to {}", email))
        })
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(InviteResult { message }))
}

async fn list_boards(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let boards = state
        .db
        .call(|db| db.list_boards())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(boards))
}

async fn create_board(
    State(state): State<SharedState>,
    Json(req): Json<CreateBoardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require("title", &req.title)?;

    let owner_id = req.owner_id;
    let owner = state
        .db
        .call(move |db| db.get_user(owner_id))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    if owner.is_none() {
        return Err(ApiError::NotFound(format!("User {} not found", owner_id)));
    }

    let title = req.title;
    let description = req.description;
    let board = state
        .db
        .call(move |db| db.create_board(&title, description.as_deref(), owner_id))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    tracing::info!(board_id = board.id, "board created");
    Ok((StatusCode::CREATED, Json(board)))
}

async fn get_board(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let board = state
        .db
        .call(move |db| db.get_board(id))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("Board {} not found", id)))?;
    Ok(Json(board))
}

async fn get_board_view(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state
        .db
        .call(move |db| db.board_view(id))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("Board {} not found", id)))?;
    Ok(Json(view))
}

async fn list_board_members(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let members = state
        .db
        .call(move |db| {
            if db.get_board(id)?.is_none() {
                return Ok(None);
            }
            db.list_board_members(id).map(Some)
        })
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("Board {} not found", id)))?;
    Ok(Json(members))
}

async fn create_card(
    State(state): State<SharedState>,
    Path(column_id): Path<i64>,
    Json(req): Json<CreateCardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require("title", &req.title)?;

    let title = req.title;
    let description = req.description;
    let image_url = req.image_url;
    let card = state
        .db
        .call(move |db| {
            if db.get_column(column_id)?.is_none() {
                return Ok(None);
            }
            db.create_card(
                column_id,
                &title,
                description.as_deref(),
                image_url.as_deref(),
            )
            .map(Some)
        })
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("Column {} not found", column_id)))?;
    tracing::info!(card_id = card.id, column_id, "card created");
    Ok((StatusCode::CREATED, Json(card)))
}

async fn get_card(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let card = state
        .db
        .call(move |db| db.get_card(id))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("Card {} not found", id)))?;
    Ok(Json(card))
}

async fn update_card(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateCardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(title) = &req.title {
        require("title", title)?;
    }

    let changes = CardChanges {
        title: req.title,
        description: req.description,
        image_url: req.image_url,
        script: req.script,
        column_id: req.column_id,
        order: req.order,
    };
    let card = state
        .db
        .call(move |db| {
            if db.get_card(id)?.is_none() {
                return Ok(None);
            }
            db.update_card(id, &changes).map(Some)
        })
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("Card {} not found", id)))?;
    Ok(Json(card))
}

async fn delete_card(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .db
        .call(move |db| db.delete_card(id))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    if !deleted {
        return Err(ApiError::NotFound(format!("Card {} not found", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn move_card(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<MoveCardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let column_id = req.column_id;
    let order = req.order;
    let card = state
        .db
        .call(move |db| {
            if db.get_card(id)?.is_none() || db.get_column(column_id)?.is_none() {
                return Ok(None);
            }
            db.move_card(id, column_id, order).map(Some)
        })
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| {
            ApiError::NotFound(format!("Card {} or column {} not found", id, column_id))
        })?;
    tracing::info!(card_id = id, column_id, order, "card moved");
    Ok(Json(card))
}

/// The commit path of a drag session: every `(column_id, order)` pair the
/// client derived from its board snapshot, written as one batch. Any
/// failure leaves the client to reload rather than patch up its cache.
async fn reorder_cards(
    State(state): State<SharedState>,
    Json(req): Json<ReorderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let count = req.updates.len();
    let updates = req.updates;
    state
        .db
        .call(move |db| db.reorder_cards(&updates))
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "reorder failed");
            ApiError::Internal(e.to_string())
        })?;
    tracing::info!(count, "cards reordered");
    Ok(StatusCode::NO_CONTENT)
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TrackerDb;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_app() -> Router {
        let db = DbHandle::new(TrackerDb::new_in_memory().unwrap());
        let state = Arc::new(AppState { db });
        api_router().with_state(state)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn seed_user(app: &Router) -> i64 {
        let (status, user) = send(
            app,
            "POST",
            "/api/users",
            Some(serde_json::json!({"name": "Ada", "email": "ada@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        user["id"].as_i64().unwrap()
    }

    async fn seed_board(app: &Router, owner_id: i64) -> (i64, serde_json::Value) {
        let (status, board) = send(
            app,
            "POST",
            "/api/boards",
            Some(serde_json::json!({"title": "Content", "owner_id": owner_id})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let board_id = board["id"].as_i64().unwrap();
        let (status, view) = send(app, "GET", &format!("/api/boards/{}/view", board_id), None).await;
        assert_eq!(status, StatusCode::OK);
        (board_id, view)
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_create_user_then_duplicate_returns_existing() {
        let app = test_app();
        let id = seed_user(&app).await;

        let (status, user) = send(
            &app,
            "POST",
            "/api/users",
            Some(serde_json::json!({"name": "Someone Else", "email": "ada@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(user["id"].as_i64().unwrap(), id);
        assert_eq!(user["name"], "Ada");
    }

    #[tokio::test]
    async fn test_create_user_validation() {
        let app = test_app();
        let (status, body) = send(
            &app,
            "POST",
            "/api/users",
            Some(serde_json::json!({"name": "", "email": "ada@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("name"));

        let (status, body) = send(
            &app,
            "POST",
            "/api/users",
            Some(serde_json::json!({"name": "Ada", "email": "not-an-address"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("not-an-address"));
    }

    #[tokio::test]
    async fn test_current_user() {
        let app = test_app();
        let (status, _) = send(&app, "GET", "/api/users/current", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        seed_user(&app).await;
        let (status, user) = send(&app, "GET", "/api/users/current", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(user["email"], "ada@example.com");
    }

    #[tokio::test]
    async fn test_invite_derives_name_from_email() {
        let app = test_app();
        let (status, result) = send(
            &app,
            "POST",
            "/api/users/invite",
            Some(serde_json::json!({"email": "jane.doe@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["message"], "Invitation sent to jane.doe@example.com");

        let (_, users) = send(&app, "GET", "/api/users", None).await;
        assert_eq!(users[0]["name"], "Jane Doe");
    }

    #[tokio::test]
    async fn test_invite_existing_user_is_noop() {
        let app = test_app();
        seed_user(&app).await;
        let (status, result) = send(
            &app,
            "POST",
            "/api/users/invite",
            Some(serde_json::json!({"email": "ada@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(result["message"].as_str().unwrap().contains("already exists"));

        let (_, users) = send(&app, "GET", "/api/users", None).await;
        assert_eq!(users.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_board_seeds_template_columns() {
        let app = test_app();
        let user_id = seed_user(&app).await;
        let (board_id, view) = seed_board(&app, user_id).await;

        let columns = view["columns"].as_array().unwrap();
        assert_eq!(columns.len(), 6);
        assert_eq!(columns[0]["title"], "Discarded");
        assert_eq!(columns[5]["title"], "Published");
        assert_eq!(columns[5]["order"], 5);

        let (status, members) =
            send(&app, "GET", &format!("/api/boards/{}/members", board_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(members[0]["role"], "owner");
    }

    #[tokio::test]
    async fn test_create_board_requires_title_and_owner() {
        let app = test_app();
        let user_id = seed_user(&app).await;

        let (status, _) = send(
            &app,
            "POST",
            "/api/boards",
            Some(serde_json::json!({"title": "  ", "owner_id": user_id})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "POST",
            "/api/boards",
            Some(serde_json::json!({"title": "Content", "owner_id": 999})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_card_lifecycle() {
        let app = test_app();
        let user_id = seed_user(&app).await;
        let (_, view) = seed_board(&app, user_id).await;
        let ideating = view["columns"][1]["id"].as_i64().unwrap();

        // Create two cards; orders are assigned in sequence.
        let (status, first) = send(
            &app,
            "POST",
            &format!("/api/columns/{}/cards", ideating),
            Some(serde_json::json!({"title": "Episode 1"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(first["order"], 0);
        let (_, second) = send(
            &app,
            "POST",
            &format!("/api/columns/{}/cards", ideating),
            Some(serde_json::json!({"title": "Episode 2", "description": "Follow-up"})),
        )
        .await;
        assert_eq!(second["order"], 1);

        // Patch the script the way the card detail page does.
        let card_id = first["id"].as_i64().unwrap();
        let (status, patched) = send(
            &app,
            "PATCH",
            &format!("/api/cards/{}", card_id),
            Some(serde_json::json!({"script": "<p>Hello</p>"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(patched["script"], "<p>Hello</p>");
        assert_eq!(patched["title"], "Episode 1");

        // Delete, then the card is gone.
        let (status, _) = send(&app, "DELETE", &format!("/api/cards/{}", card_id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "GET", &format!("/api/cards/{}", card_id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_card_rejects_blank_title() {
        let app = test_app();
        let user_id = seed_user(&app).await;
        let (_, view) = seed_board(&app, user_id).await;
        let ideating = view["columns"][1]["id"].as_i64().unwrap();
        let (_, card) = send(
            &app,
            "POST",
            &format!("/api/columns/{}/cards", ideating),
            Some(serde_json::json!({"title": "Episode 1"})),
        )
        .await;

        let (status, _) = send(
            &app,
            "PATCH",
            &format!("/api/cards/{}", card["id"]),
            Some(serde_json::json!({"title": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_move_card_endpoint() {
        let app = test_app();
        let user_id = seed_user(&app).await;
        let (_, view) = seed_board(&app, user_id).await;
        let ideating = view["columns"][1]["id"].as_i64().unwrap();
        let scripting = view["columns"][2]["id"].as_i64().unwrap();
        let (_, card) = send(
            &app,
            "POST",
            &format!("/api/columns/{}/cards", ideating),
            Some(serde_json::json!({"title": "Episode 1"})),
        )
        .await;

        let (status, moved) = send(
            &app,
            "PATCH",
            &format!("/api/cards/{}/move", card["id"]),
            Some(serde_json::json!({"column_id": scripting, "order": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(moved["column_id"].as_i64().unwrap(), scripting);
    }

    #[tokio::test]
    async fn test_reorder_endpoint_roundtrip() {
        let app = test_app();
        let user_id = seed_user(&app).await;
        let (board_id, view) = seed_board(&app, user_id).await;
        let ideating = view["columns"][1]["id"].as_i64().unwrap();
        let scripting = view["columns"][2]["id"].as_i64().unwrap();
        let (_, x) = send(
            &app,
            "POST",
            &format!("/api/columns/{}/cards", ideating),
            Some(serde_json::json!({"title": "X"})),
        )
        .await;
        let (_, y) = send(
            &app,
            "POST",
            &format!("/api/columns/{}/cards", ideating),
            Some(serde_json::json!({"title": "Y"})),
        )
        .await;

        let (status, _) = send(
            &app,
            "POST",
            "/api/cards/reorder",
            Some(serde_json::json!({"updates": [
                {"id": x["id"], "column_id": scripting, "order": 0},
                {"id": y["id"], "column_id": ideating, "order": 0},
            ]})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, view) = send(&app, "GET", &format!("/api/boards/{}/view", board_id), None).await;
        let scripting_cards = view["columns"][2]["cards"].as_array().unwrap();
        assert_eq!(scripting_cards.len(), 1);
        assert_eq!(scripting_cards[0]["title"], "X");
    }

    #[tokio::test]
    async fn test_board_view_missing_board_is_404() {
        let app = test_app();
        let (status, _) = send(&app, "GET", "/api/boards/42/view", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_name_from_email() {
        assert_eq!(name_from_email("jane.doe@example.com"), "Jane Doe");
        assert_eq!(name_from_email("ada@example.com"), "Ada");
        assert_eq!(name_from_email("x.y.z@example.com"), "X Y Z");
        assert_eq!(name_from_email("weird..dots@example.com"), "Weird Dots");
    }
}

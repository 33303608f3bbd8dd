//! Axum route handlers for saved-document management: the bounded recent
//! log and the curated favorites set.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::document::{DocumentKind, ListQuery};
use crate::routes::success;
use crate::state::AppState;
use crate::store::DocumentStore;

const DEFAULT_RECENT_PAGE: i64 = 20;
const DEFAULT_FAVORITES_PAGE: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl ListParams {
    fn into_query(self, default_limit: i64) -> Result<ListQuery, AppError> {
        let kind = match self.kind.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(DocumentKind::parse(raw).ok_or_else(|| {
                AppError::Validation("type must be 'resume' or 'cover_letter'".to_string())
            })?),
        };
        Ok(ListQuery {
            limit: self.limit.unwrap_or(default_limit).max(0),
            offset: self.offset.unwrap_or(0).max(0),
            kind,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct SaveDocumentRequest {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "documentType")]
    pub document_type: String,
    pub content: String,
}

/// POST /api/documents/save
///
/// Appends to the recent log; the store prunes beyond the retention cap in
/// the same transaction.
pub async fn handle_save(
    State(state): State<AppState>,
    Json(request): Json<SaveDocumentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    if request.user_id.trim().is_empty() || request.content.is_empty() {
        return Err(AppError::Validation(
            "userId and content are required".to_string(),
        ));
    }
    let kind = DocumentKind::parse(&request.document_type).ok_or_else(|| {
        AppError::Validation("documentType must be 'resume' or 'cover_letter'".to_string())
    })?;

    let document = state
        .documents
        .append_recent(&request.user_id, kind, &request.content)
        .await?;

    Ok((StatusCode::CREATED, success(document)))
}

/// GET /api/documents/recent/:auth_id
pub async fn handle_list_recent(
    State(state): State<AppState>,
    Path(auth_id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, AppError> {
    let query = params.into_query(DEFAULT_RECENT_PAGE)?;
    let page = state.documents.list_recent(&auth_id, &query).await?;
    Ok(success(page))
}

/// GET /api/documents/favorites/:auth_id
pub async fn handle_list_favorites(
    State(state): State<AppState>,
    Path(auth_id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, AppError> {
    let query = params.into_query(DEFAULT_FAVORITES_PAGE)?;
    let page = state.documents.list_favorites(&auth_id, &query).await?;
    Ok(success(page))
}

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// GET /api/documents/:document_id
///
/// Looks the id up in both stores (recent wins). Ownership verification is
/// optional and, when it fails, reports access-denied rather than
/// not-found.
pub async fn handle_get_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    Query(params): Query<OwnerQuery>,
) -> Result<Json<Value>, AppError> {
    let record = state
        .documents
        .get_document(document_id, params.user_id.as_deref())
        .await?;
    Ok(success(record))
}

#[derive(Debug, Deserialize)]
pub struct OwnerBody {
    #[serde(rename = "userId")]
    pub user_id: String,
}

/// POST /api/documents/:document_id/favorite
pub async fn handle_favorite(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    Json(body): Json<OwnerBody>,
) -> Result<Json<Value>, AppError> {
    let outcome = state
        .documents
        .promote(document_id, &body.user_id)
        .await?;

    let message = if outcome.already_favorited {
        "Document was already in favorites"
    } else {
        "Document added to favorites"
    };
    Ok(success(json!({
        "message": message,
        "document": outcome.document,
        "alreadyFavorited": outcome.already_favorited,
    })))
}

#[derive(Debug, Deserialize)]
pub struct OwnerParam {
    #[serde(rename = "userId")]
    pub user_id: String,
}

/// DELETE /api/documents/favorites/:document_id
pub async fn handle_unfavorite(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    Query(params): Query<OwnerParam>,
) -> Result<Json<Value>, AppError> {
    let removed = state
        .documents
        .demote(document_id, &params.user_id)
        .await?;

    let message = if removed {
        "Document removed from favorites"
    } else {
        "Document was not in favorites"
    };
    Ok(success(json!({ "message": message, "removed": removed })))
}

/// DELETE /api/documents/recent/:document_id
pub async fn handle_delete_recent(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    Query(params): Query<OwnerParam>,
) -> Result<Json<Value>, AppError> {
    let deleted = state
        .documents
        .delete_recent(document_id, &params.user_id)
        .await?;

    let message = if deleted {
        "Document deleted successfully"
    } else {
        "Document not found"
    };
    Ok(success(json!({ "message": message, "deleted": deleted })))
}

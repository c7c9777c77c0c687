use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::Utc;

use bulletin_types::api::{ArticleResponse, CreateArticleRequest, CreateArticleResponse};
use bulletin_types::models::{ContentItem, NewContentItem};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn create_article(
    State(state): State<AppState>,
    Json(req): Json<CreateArticleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = req.title.trim();
    if title.is_empty() {
        return Err(ApiError::Validation("title must not be empty".into()));
    }

    let attachment = req
        .image
        .as_deref()
        .map(|image| B64.decode(image))
        .transpose()
        .map_err(|_| ApiError::Validation("image is not valid base64".into()))?;

    let (item, notification) = state
        .coordinator
        .submit_content(NewContentItem {
            title: title.to_string(),
            body: req.text,
            attachment,
            group_id: req.group_id,
            created_at: Utc::now(),
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateArticleResponse {
            article: article_response(item),
            notification,
        }),
    ))
}

pub async fn list_articles(State(state): State<AppState>) -> Result<Json<Vec<ArticleResponse>>, ApiError> {
    let items = state.coordinator.repository().list_content().await?;
    Ok(Json(items.into_iter().map(article_response).collect()))
}

/// Articles filed under a company. The company itself need not exist.
pub async fn list_company_articles(
    State(state): State<AppState>,
    Path(company_id): Path<i64>,
) -> Result<Json<Vec<ArticleResponse>>, ApiError> {
    let items = state.coordinator.repository().list_content_by_group(company_id).await?;
    Ok(Json(items.into_iter().map(article_response).collect()))
}

fn article_response(item: ContentItem) -> ArticleResponse {
    ArticleResponse {
        id: item.id,
        title: item.title,
        text: item.body,
        image: item.attachment.map(|bytes| B64.encode(bytes)),
        group_id: item.group_id,
        created_at: item.created_at,
    }
}

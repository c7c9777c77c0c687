use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;

use bulletin_types::api::{CreateCommentRequest, DeleteCommentResponse, NotificationStatus};
use bulletin_types::models::{Comment, CommentId, ContentId};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct PostCommentResponse {
    pub comment: Comment,
    pub notification: NotificationStatus,
}

pub async fn list_comments(
    State(state): State<AppState>,
    Path(article_id): Path<i64>,
) -> Result<Json<Vec<Comment>>, ApiError> {
    let comments = state.coordinator.comments().list(ContentId(article_id)).await?;
    if comments.is_empty() {
        return Err(ApiError::NotFound(format!("no comments on article {article_id}")));
    }
    Ok(Json(comments))
}

pub async fn post_comment(
    State(state): State<AppState>,
    Path(article_id): Path<i64>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let posted = state
        .coordinator
        .submit_comment(ContentId(article_id), req.parent_id, &req.author, &req.body)
        .await?;

    // The reply notice keeps running after the response is sent.
    let notification = if posted.reply_notice.is_some() {
        NotificationStatus::Queued
    } else {
        NotificationStatus::NotRequested
    };

    Ok((
        StatusCode::CREATED,
        Json(PostCommentResponse {
            comment: posted.comment,
            notification,
        }),
    ))
}

pub async fn get_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<i64>,
) -> Result<Json<Comment>, ApiError> {
    let comment = state.coordinator.comments().get(CommentId(comment_id)).await?;
    Ok(Json(comment))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<i64>,
) -> Result<Json<DeleteCommentResponse>, ApiError> {
    let deleted = state.coordinator.delete_comment(CommentId(comment_id)).await?;
    Ok(Json(DeleteCommentResponse { deleted }))
}

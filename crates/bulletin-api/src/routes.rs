use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;
use crate::{articles, comments, companies, notifications};

/// All HTTP routes. Layers (tracing, CORS) are added by the caller.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "API is running." }))
        .route("/articles", post(articles::create_article).get(articles::list_articles))
        .route("/companies", get(companies::list_companies).post(companies::create_company))
        .route("/companies/{company_id}", get(companies::get_company))
        .route("/companies/{company_id}/articles", get(articles::list_company_articles))
        .route(
            "/articles/{article_id}/comments",
            get(comments::list_comments).post(comments::post_comment),
        )
        .route(
            "/comments/{comment_id}",
            get(comments::get_comment).delete(comments::delete_comment),
        )
        .route("/notifications/test", post(notifications::send_test))
        .with_state(state)
}

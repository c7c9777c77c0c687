use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;

use bulletin_types::api::{CompanyResponse, CreateCompanyRequest};
use bulletin_types::models::{Company, NewCompany};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn create_company(
    State(state): State<AppState>,
    Json(req): Json<CreateCompanyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = req.title.trim();
    if title.is_empty() {
        return Err(ApiError::Validation("title must not be empty".into()));
    }
    let image = req
        .image
        .as_deref()
        .map(|image| B64.decode(image))
        .transpose()
        .map_err(|_| ApiError::Validation("image is not valid base64".into()))?;

    let company = state
        .coordinator
        .repository()
        .insert_company(NewCompany {
            title: title.to_string(),
            image,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(company_response(company))))
}

pub async fn list_companies(State(state): State<AppState>) -> Result<Json<Vec<CompanyResponse>>, ApiError> {
    let companies = state.coordinator.repository().list_companies().await?;
    Ok(Json(companies.into_iter().map(company_response).collect()))
}

pub async fn get_company(
    State(state): State<AppState>,
    Path(company_id): Path<i64>,
) -> Result<Json<CompanyResponse>, ApiError> {
    let company = state
        .coordinator
        .repository()
        .find_company(company_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("company {company_id} not found")))?;
    Ok(Json(company_response(company)))
}

fn company_response(company: Company) -> CompanyResponse {
    CompanyResponse {
        id: company.id,
        title: company.title,
        image: company.image.map(|bytes| B64.encode(bytes)),
    }
}

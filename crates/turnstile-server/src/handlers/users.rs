//! User API handlers.
//!
//! Every route takes a JSON body and answers with [`ApiResponse`] on success
//! or an [`AppError`] envelope on failure.

use axum::{Json, extract::State, extract::rejection::JsonRejection};
use serde::Deserialize;
use tracing::{Span, debug, instrument};
use turnstile_core::{NewUser, PhoneNumber, User, UserPatch, UserStatus};
use turnstile_store::Page;

use crate::error::AppError;
use crate::handlers::response::{ApiResponse, UserListData};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneRequest {
    pub phone_number: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRequest {
    pub phone_number: String,
    pub status: i32,
    pub valid_time: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListRequest {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

impl ListRequest {
    fn page(&self) -> Page {
        Page::new(self.page.unwrap_or(1), self.page_size.unwrap_or(0))
    }
}

/// Parsea el telefono y lo registra en el span actual.
fn parse_phone(raw: &str) -> Result<PhoneNumber, AppError> {
    let phone = PhoneNumber::parse(raw)?;
    Span::current().record("phone", phone.as_str());
    Ok(phone)
}

/// POST /api/query
#[instrument(skip_all, fields(phone = tracing::field::Empty))]
pub async fn query_user(
    State(state): State<AppState>,
    payload: Result<Json<PhoneRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<User>>, AppError> {
    let Json(request) = payload?;
    let phone = parse_phone(&request.phone_number)?;

    let user = state.users().find(&phone).await?;
    debug!(user_id = user.id, active = user.is_active(), "User resolved");

    Ok(Json(ApiResponse::ok(User::clone(&user))))
}

/// POST /api/add
#[instrument(skip_all, fields(phone = tracing::field::Empty))]
pub async fn add_user(
    State(state): State<AppState>,
    payload: Result<Json<UserRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<User>>, AppError> {
    let Json(request) = payload?;
    let phone = parse_phone(&request.phone_number)?;
    let status = UserStatus::try_from(request.status)?;

    let user = state
        .users()
        .create(NewUser::new(phone, status, request.valid_time))
        .await?;

    Ok(Json(ApiResponse::ok(user)))
}

/// POST /api/edit
#[instrument(skip_all, fields(phone = tracing::field::Empty))]
pub async fn edit_user(
    State(state): State<AppState>,
    payload: Result<Json<UserRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<User>>, AppError> {
    let Json(request) = payload?;
    let phone = parse_phone(&request.phone_number)?;
    let status = UserStatus::try_from(request.status)?;

    let user = state
        .users()
        .update(&phone, UserPatch::new(status, request.valid_time))
        .await?;

    Ok(Json(ApiResponse::ok(user)))
}

/// POST /api/delete
#[instrument(skip_all, fields(phone = tracing::field::Empty))]
pub async fn delete_user(
    State(state): State<AppState>,
    payload: Result<Json<PhoneRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let Json(request) = payload?;
    let phone = parse_phone(&request.phone_number)?;

    state.users().remove(&phone).await?;

    Ok(Json(ApiResponse::empty()))
}

/// POST /api/list
#[instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    payload: Result<Json<ListRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<UserListData>>, AppError> {
    let Json(request) = payload?;
    let page = state.users().list(request.page()).await?;

    Ok(Json(ApiResponse::ok(UserListData {
        total: page.total,
        list: page.users,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_request_defaults() {
        let request: ListRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.page(), Page::new(1, 10));

        let request: ListRequest =
            serde_json::from_str(r#"{"page": 3, "pageSize": 500}"#).unwrap();
        assert_eq!(request.page(), Page { limit: 100, offset: 200 });
    }
}

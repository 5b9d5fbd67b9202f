use crate::endpoint::AuthEndpoint;
use axum::{extract::Extension, http::StatusCode, response::IntoResponse};
use std::sync::Arc;
use tracing::instrument;

#[utoipa::path(
    post,
    path= "/logout",
    responses (
        (status = 200, description = "Signed out"),
    ),
    tag= "relay"
)]
#[instrument(skip_all)]
pub async fn logout(endpoint: Extension<Arc<dyn AuthEndpoint>>) -> impl IntoResponse {
    endpoint.logout().await;
    StatusCode::OK
}

use crate::endpoint::AuthEndpoint;
use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;
use utoipa::IntoParams;

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query, rename_all = "camelCase")]
pub struct RefreshParams {
    /// Refresh request sealed under the `refresh` purpose.
    pub encoded_refresh_dto: Option<String>,
}

#[utoipa::path(
    post,
    path= "/refresh",
    params(RefreshParams),
    responses (
        (status = 200, description = "Sign-in refreshed"),
        (status = 400, description = "Refused"),
    ),
    tag= "relay"
)]
#[instrument(skip_all)]
pub async fn refresh(
    endpoint: Extension<Arc<dyn AuthEndpoint>>,
    Query(params): Query<RefreshParams>,
) -> impl IntoResponse {
    let encoded = params.encoded_refresh_dto.unwrap_or_default();

    if endpoint.refresh(&encoded).await.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    }
}

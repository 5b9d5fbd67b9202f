use crate::endpoint::AuthEndpoint;
use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, instrument};
use utoipa::IntoParams;

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query, rename_all = "camelCase")]
pub struct LoginParams {
    /// Sign-in request sealed under the `login` purpose.
    pub encoded_login_model: Option<String>,
}

#[utoipa::path(
    post,
    path= "/login",
    params(LoginParams),
    responses (
        (status = 200, description = "Signed in; body is the sealed response", body = String, content_type = "text/plain"),
        (status = 400, description = "Refused; body is the sealed response carrying the reason", body = String, content_type = "text/plain"),
        (status = 500, description = "Response could not be sealed"),
    ),
    tag= "relay"
)]
#[instrument(skip_all)]
pub async fn login(
    endpoint: Extension<Arc<dyn AuthEndpoint>>,
    Query(params): Query<LoginParams>,
) -> impl IntoResponse {
    let encoded = params.encoded_login_model.unwrap_or_default();

    match endpoint.login(&encoded).await {
        Ok(reply) if reply.result.succeeded() => (StatusCode::OK, reply.envelope),
        Ok(reply) => (StatusCode::BAD_REQUEST, reply.envelope),
        Err(err) => {
            error!("Failed to seal login response: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reward_types::RewardError;
use serde_json::json;

/// Wraps [`RewardError`] so handlers can use `?` and still only ever expose
/// [`RewardError::public_message`], never the internal `Display` text.
pub struct ApiError(pub RewardError);

impl From<RewardError> for ApiError {
    fn from(err: RewardError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RewardError::MalformedAddress(_) | RewardError::InvalidAddress(_) => StatusCode::BAD_REQUEST,
            RewardError::NothingToClaim => StatusCode::TOO_MANY_REQUESTS,
            RewardError::NonceReplay | RewardError::StaleNonce => StatusCode::CONFLICT,
            RewardError::CalculatorUnauthorized => StatusCode::FORBIDDEN,
            RewardError::PriceUnavailable | RewardError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RewardError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::error!(error = %self.0, "request failed");
        (status, Json(json!({ "error": self.0.public_message() }))).into_response()
    }
}

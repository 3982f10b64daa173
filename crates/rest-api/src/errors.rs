use axum::http::StatusCode;
use tracing::error;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Failed(anyhow::Error),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::NotFound(what) => write!(f, "{what} not found"),
            ApiError::BadRequest(why) => write!(f, "bad request: {why}"),
            ApiError::Failed(e) => std::fmt::Display::fmt(e, f),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::Failed(err) => Some(err.root_cause()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        ApiError::Failed(value)
    }
}

impl From<hookforge_store::StoreError> for ApiError {
    fn from(value: hookforge_store::StoreError) -> Self {
        ApiError::Failed(value.into())
    }
}

impl From<hookforge_queue::QueueError> for ApiError {
    fn from(value: hookforge_queue::QueueError) -> Self {
        ApiError::Failed(value.into())
    }
}

pub fn api_error(err: ApiError) -> (StatusCode, String) {
    error!(error = ?err, "api request failed");
    let status = match err {
        ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        ApiError::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

use log::warn;
use rouille::Response;

use crate::{proxy::ProxyError, storage::error::StorageError};

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    BadGateway(String),
    Internal(String),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::TrackNotFound(id) => ApiError::NotFound(format!("track {} not found", id)),

            StorageError::PlaylistNotFound(id) => {
                ApiError::NotFound(format!("playlist {} not found", id))
            }

            StorageError::Database(_) | StorageError::Fs(_) | StorageError::Internal(_) => {
                warn!("storage failure: {err}");
                ApiError::Internal("internal server error".into())
            }
        }
    }
}

impl From<ProxyError> for ApiError {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::NotFound(id) => ApiError::NotFound(format!("track {} not found", id)),
            ProxyError::Upstream(e) => {
                warn!("stream upstream failure: {e}");
                ApiError::BadGateway("upstream storage unavailable".into())
            }
            ProxyError::Storage(e) => e.into(),
        }
    }
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::NotFound(_) => 404,
            ApiError::BadRequest(_) => 400,
            ApiError::BadGateway(_) => 502,
            ApiError::Internal(_) => 500,
        }
    }

    pub fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::BadGateway(msg)
            | ApiError::Internal(msg) => Response::text(msg).with_status_code(status),
        }
    }
}

// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::application::use_cases::run_batch_use_case::RunUseCaseError;
use crate::utils::errors::RepositoryError;

/// 应用错误类型
///
/// 封装所有可能的应用层错误，提供统一的错误处理接口
#[derive(Debug)]
pub struct AppError(anyhow::Error);

impl AppError {
    pub fn status(&self) -> StatusCode {
        if let Some(err) = self.0.downcast_ref::<RunUseCaseError>() {
            return match err {
                RunUseCaseError::ValidationError(_) => StatusCode::BAD_REQUEST,
                RunUseCaseError::SiteNotFound(_) => StatusCode::NOT_FOUND,
                RunUseCaseError::Busy => StatusCode::CONFLICT,
                RunUseCaseError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
        }
        match self.0.downcast_ref::<RepositoryError>() {
            Some(RepositoryError::NotFound(_)) => StatusCode::NOT_FOUND,
            Some(RepositoryError::InvalidData(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }
        let body = Json(json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

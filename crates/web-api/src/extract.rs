use axum::{
    extract::{FromRequest, Request},
    http::HeaderMap,
    Json,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::ApiError;

/// 调用方身份的请求头
pub const USER_HEADER: &str = "user";

/// 解析 JSON 请求体并执行 `validator` 校验，失败统一返回 422
#[derive(Debug)]
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::validation(rejection.body_text()))?;
        value.validate()?;
        Ok(Self(value))
    }
}

/// 读取 `User` 请求头，缺失或不是合法文本时返回 `None`
pub fn caller(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

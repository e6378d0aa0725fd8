use axum::{
    async_trait,
    body::HttpBody,
    extract::FromRequest,
    http::{header, Request},
    BoxError, Form, Json,
};
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// A request body that is either JSON or an urlencoded form, picked from
/// the content type. Rejections come back as our JSON 400 instead of
/// axum's plain text ones.
pub(crate) struct Payload<T>(pub(crate) T);

#[async_trait]
impl<T, S, B> FromRequest<S, B> for Payload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
    B: HttpBody + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    type Rejection = AppError;

    async fn from_request(req: Request<B>, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
            .unwrap_or(false);

        if is_form {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|rejection| AppError::InvalidRequest(rejection.body_text()))?;
            Ok(Payload(value))
        } else {
            let Json(value) = Json::<T>::from_request(req, state)
                .await
                .map_err(|rejection| AppError::InvalidRequest(rejection.body_text()))?;
            Ok(Payload(value))
        }
    }
}

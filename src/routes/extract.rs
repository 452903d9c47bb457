use axum::{
    Json,
    extract::{FromRequest, OptionalFromRequest, Request},
};
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// JSON body extractor whose rejections render as [`AppError`] instead of plain text.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// `Option<AppJson<T>>` yields `None` when the request carries no JSON content type.
impl<T, S> OptionalFromRequest<S> for AppJson<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Option<Self>, Self::Rejection> {
        let payload = <Json<T> as OptionalFromRequest<S>>::from_request(req, state).await?;
        Ok(payload.map(|Json(value)| AppJson(value)))
    }
}

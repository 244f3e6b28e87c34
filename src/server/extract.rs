use axum::{
    async_trait,
    extract::{Extension, FromRequest, RequestParts},
    http::header::AUTHORIZATION,
};

use crate::auth::{DynAuthenticator, User};
use crate::error::{unauthorized_error, unexpected_error, Error};

/// Authenticates the caller from an `Authorization: Bearer <token>` header.
#[async_trait]
impl<B> FromRequest<B> for User
where
    B: Send,
{
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let Extension(authenticator) = Extension::<DynAuthenticator>::from_request(req)
            .await
            .map_err(|err| {
                tracing::error!("authenticator missing: {}", err);
                unexpected_error()
            })?;

        let token = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(unauthorized_error)?;

        authenticator.authenticate(token).await
    }
}

//! Request extractors whose rejections go through `NexusError`, so a malformed
//! body or query gets the same `{error, code}` envelope as every other failure.

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Multipart, Query, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;

use crate::NexusError;

/// `Json<T>` with a JSON error body on rejection.
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = NexusError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// `Query<T>` with a JSON error body on rejection.
#[derive(Debug)]
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = NexusError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

/// `Multipart` that rejects a wrong content type with a JSON error body.
pub struct ApiMultipart(pub Multipart);

impl<S> FromRequest<S> for ApiMultipart
where
    S: Send + Sync,
{
    type Rejection = NexusError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(Multipart::from_request(req, state).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{self, StatusCode, header};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Increment {
        #[serde(rename = "type")]
        kind: Option<String>,
    }

    fn json_request(body: &'static str) -> Request {
        http::Request::post("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn valid_json_is_passed_through() {
        let ApiJson(body) = ApiJson::<Increment>::from_request(json_request(r#"{"type":"gen"}"#), &())
            .await
            .unwrap();
        assert_eq!(body.kind.as_deref(), Some("gen"));
    }

    #[tokio::test]
    async fn wrong_field_type_is_a_json_body_error() {
        let err = ApiJson::<Increment>::from_request(json_request(r#"{"type": 5}"#), &())
            .await
            .unwrap_err();
        assert!(matches!(err, NexusError::JsonBody(_)));
    }

    #[tokio::test]
    async fn multipart_needs_a_boundary() {
        let req = http::Request::post("/")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("hello"))
            .unwrap();
        let err = ApiMultipart::from_request(req, &()).await.err().unwrap();
        match err {
            NexusError::MultipartBody(rej) => assert_eq!(rej.status(), StatusCode::BAD_REQUEST),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

//! simd-json request and response bodies for reqwest, reporting failures as
//! [`ApiError`] so the client can use `?` throughout.

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::client::ApiError;

pub trait ReqwestSimdJsonExt: Sized {
    /// Set a JSON body serialized with simd-json.
    fn simd_json<T>(self, body: &T) -> Result<Self, ApiError>
    where
        T: Serialize + ?Sized;
}

pub trait ResponseSimdJsonExt {
    /// Decode the body. A blank body is a decode error rather than `null`.
    async fn simd_json<T>(self) -> Result<T, ApiError>
    where
        T: DeserializeOwned;
}

impl ReqwestSimdJsonExt for RequestBuilder {
    fn simd_json<T>(self, body: &T) -> Result<Self, ApiError>
    where
        T: Serialize + ?Sized,
    {
        let body = simd_json::to_vec(body)?;
        Ok(self
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(body))
    }
}

impl ResponseSimdJsonExt for Response {
    async fn simd_json<T>(self) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let mut bytes = self.bytes().await?.to_vec();
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(ApiError::Decode("empty response body".to_string()));
        }
        simd_json::from_slice(&mut bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

//! Backend transport seams
//!
//! The backend is reached two ways:
//! - [`SocketTransport`]: JSON request/response messages over the persistent
//!   socket, selected by `msg["type"]` (`trace/get`, `trace/list`, ...)
//! - [`ApiTransport`]: REST-style calls under `/api/` (`logbook/...`)
//!
//! The socket connection itself lives outside this crate. [`RestClient`]
//! covers the REST side; [`crate::mock::MockBackend`] implements both for
//! demos and tests.
//!
//! Nothing here retries. A failed call comes back as an error and retrying
//! is left to whoever triggered the call.

mod rest;

pub use rest::RestClient;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Result;

/// HTTP verb of a REST call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl ApiMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiMethod::Get => "GET",
            ApiMethod::Post => "POST",
            ApiMethod::Put => "PUT",
            ApiMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for ApiMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request/response messages over the backend socket
#[async_trait]
pub trait SocketTransport: Send + Sync {
    /// Send `msg` and wait for its result.
    async fn call_ws(&self, msg: Value) -> Result<Value>;

    /// Send `msg` without waiting for a result.
    async fn send_ws(&self, msg: Value) -> Result<()>;
}

/// REST-style calls relative to `/api/`
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn call_api(&self, method: ApiMethod, path: &str, params: Option<&Value>)
        -> Result<Value>;
}

/// Send a socket command and decode its result.
pub async fn ws_command<T: DeserializeOwned>(
    transport: &dyn SocketTransport,
    msg: Value,
) -> Result<T> {
    let raw = transport.call_ws(msg).await?;
    Ok(serde_json::from_value(raw)?)
}

/// Issue a REST call and decode its result.
pub async fn api_request<T: DeserializeOwned>(
    transport: &dyn ApiTransport,
    method: ApiMethod,
    path: &str,
    params: Option<&Value>,
) -> Result<T> {
    let raw = transport.call_api(method, path, params).await?;
    Ok(serde_json::from_value(raw)?)
}

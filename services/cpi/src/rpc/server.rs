//! Serve-once request handling.

use std::io::{self, Read, Write};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::message::{ActionRequest, ActionResponse, ErrorEnvelope};
use crate::dispatch::Dispatcher;
use crate::error::ErrorKind;

/// Failures that prevent a response from being produced at all.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("reading request: {0}")]
    Read(#[source] io::Error),

    #[error("encoding response: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("writing response: {0}")]
    Write(#[source] io::Error),
}

/// Serves at most one request per process.
pub struct RpcServer {
    dispatcher: Dispatcher,
}

impl RpcServer {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Read one request from `input`, dispatch it, and write exactly one
    /// response to `output`.
    ///
    /// Consumes the server: a process answers a single request. Errors are
    /// returned only when no response could be written; CPI failures are
    /// encoded into the response instead.
    pub async fn serve_once<R, W>(
        self,
        input: R,
        mut output: W,
    ) -> Result<ActionResponse, TransportError>
    where
        R: Read,
        W: Write,
    {
        let response = match read_request(input)? {
            Ok(request) => self.dispatch(request).await,
            Err(reason) => {
                warn!(reason = %reason, "Rejecting malformed request");
                ActionResponse::Error(ErrorEnvelope::new(
                    ErrorKind::Generic,
                    format!("Deserializing request: {reason}"),
                ))
            }
        };

        serde_json::to_writer(&mut output, &response).map_err(TransportError::Encode)?;
        output.write_all(b"\n").map_err(TransportError::Write)?;
        output.flush().map_err(TransportError::Write)?;

        debug!(error = response.is_error(), "Response written");
        Ok(response)
    }

    async fn dispatch(&self, request: ActionRequest) -> ActionResponse {
        let span = info_span!(
            "cpi_request",
            method = %request.method,
            request_id = request.request_id().unwrap_or(""),
        );

        async move {
            info!(
                args = request.arguments.len(),
                api_version = request.api_version,
                "Handling request"
            );

            match self
                .dispatcher
                .dispatch(&request.method, request.arguments)
                .await
            {
                Ok(result) => {
                    info!("Request succeeded");
                    ActionResponse::Result(result)
                }
                Err(e) => {
                    error!(error = %e, kind = ?e.kind(), "Request failed");
                    ActionResponse::Error(ErrorEnvelope::from(&e))
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Read a single JSON value from `input`.
///
/// The outer error is a transport failure; the inner one describes a
/// request that arrived but could not be understood.
fn read_request<R: Read>(input: R) -> Result<Result<ActionRequest, String>, TransportError> {
    let mut values = serde_json::Deserializer::from_reader(input).into_iter::<Value>();

    let value = match values.next() {
        None => return Ok(Err("empty request".to_string())),
        Some(Err(e)) if e.is_io() => return Err(TransportError::Read(io::Error::other(e))),
        Some(Err(e)) => return Ok(Err(e.to_string())),
        Some(Ok(value)) => value,
    };

    Ok(serde_json::from_value(value).map_err(|e| e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Action;
    use crate::error::CpiError;
    use async_trait::async_trait;
    use serde_json::json;

    struct Ping;

    #[async_trait]
    impl Action for Ping {
        type Args = ();
        type Output = &'static str;

        async fn run(&self, _: ()) -> Result<&'static str, CpiError> {
            Ok("pong")
        }
    }

    async fn serve(input: &[u8]) -> (ActionResponse, Value) {
        let server = RpcServer::new(Dispatcher::new().with("ping", Ping));
        let mut output = Vec::new();
        let response = server.serve_once(input, &mut output).await.unwrap();
        let written: Value = serde_json::from_slice(&output).unwrap();
        (response, written)
    }

    #[tokio::test]
    async fn test_serves_one_request() {
        let (response, written) = serve(br#"{"method":"ping","arguments":[],"context":{}}"#).await;
        assert_eq!(response, ActionResponse::Result(json!("pong")));
        assert_eq!(written, json!({"result": "pong", "error": null, "log": ""}));
    }

    #[tokio::test]
    async fn test_malformed_json_yields_generic_error() {
        let (response, written) = serve(b"{not json").await;
        assert!(response.is_error());
        assert_eq!(written["error"]["type"], "Bosh::Clouds::CloudError");
        assert_eq!(written["error"]["ok_to_retry"], false);
    }

    #[tokio::test]
    async fn test_empty_input_yields_generic_error() {
        let (response, _) = serve(b"").await;
        match response {
            ActionResponse::Error(envelope) => assert_eq!(envelope.kind, ErrorKind::Generic),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_wrong_shape_yields_generic_error() {
        let (_, written) = serve(br#"{"method": 5, "arguments": []}"#).await;
        assert_eq!(written["error"]["type"], "Bosh::Clouds::CloudError");
    }

    #[tokio::test]
    async fn test_only_first_request_is_served() {
        let input = br#"{"method":"ping","arguments":[]} {"method":"ping","arguments":[]}"#;
        let server = RpcServer::new(Dispatcher::new().with("ping", Ping));
        let mut output = Vec::new();
        server.serve_once(&input[..], &mut output).await.unwrap();

        let text = String::from_utf8(output).unwrap();
        assert_eq!(text.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_method_is_not_supported() {
        let (_, written) = serve(br#"{"method":"snapshot_disk","arguments":["d", {}]}"#).await;
        assert_eq!(written["error"]["type"], "Bosh::Clouds::NotSupported");
        assert!(written["error"]["message"]
            .as_str()
            .unwrap()
            .contains("snapshot_disk"));
    }
}

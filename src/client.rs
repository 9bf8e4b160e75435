//! GraphQL-over-HTTP client for downstream services
//!
//! [`HttpServiceClient`] implements the [`ServiceClient`] seam for services
//! reachable over plain HTTP: sub-queries are serialized to GraphQL text and
//! POSTed as `{"query": ...}`, responses are unwrapped from the standard
//! `{"data": ..., "errors": [...]}` envelope. Federation hand-offs travel
//! under the reserved `_federation` root field and are unwrapped the same
//! way on return.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, ExecutionError, Result};
use crate::executor::{ServiceClient, SubgraphRequest};
use crate::introspection::{IntrospectionResult, INTROSPECTION_QUERY};
use crate::selection::OperationKind;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for one downstream GraphQL service.
#[derive(Clone)]
pub struct HttpServiceClient {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpServiceClient {
    /// Create a client for the given GraphQL endpoint URL.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    /// Create a client reusing an existing connection pool.
    pub fn with_client(endpoint: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            endpoint: endpoint.into(),
            http,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST a query and unwrap the GraphQL response envelope.
    async fn post(&self, query: String, cancel: CancellationToken) -> Result<Value> {
        debug!(endpoint = %self.endpoint, %query, "posting sub-query");

        let request = self.http.post(&self.endpoint).json(&json!({ "query": query }));

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ExecutionError::Cancelled.into()),
            response = request.send() => response?,
        };

        let body: Value = tokio::select! {
            _ = cancel.cancelled() => return Err(ExecutionError::Cancelled.into()),
            body = response.json::<Value>() => body?,
        };

        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            if let Some(first) = errors.first() {
                let message = first
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown downstream error");
                return Err(ExecutionError::Downstream {
                    service: self.endpoint.clone(),
                    message: message.to_string(),
                }
                .into());
            }
        }

        match body.get("data") {
            Some(data) if !data.is_null() => Ok(data.clone()),
            _ => Err(ExecutionError::ShapeMismatch(
                "downstream response carries no data".to_string(),
            )
            .into()),
        }
    }
}

#[async_trait]
impl ServiceClient for HttpServiceClient {
    async fn introspect(&self) -> Result<IntrospectionResult> {
        let data = self
            .post(INTROSPECTION_QUERY.to_string(), CancellationToken::new())
            .await?;
        serde_json::from_value(data).map_err(Error::from)
    }

    async fn dispatch(
        &self,
        request: SubgraphRequest,
        cancel: CancellationToken,
    ) -> Result<Value> {
        let kind = request.kind;
        let data = self.post(request.to_query(), cancel).await?;

        // Federation sub-queries come back nested under the reserved root
        // field; unwrap so the executor sees the entry-point response
        // directly.
        match kind {
            OperationKind::Federation => match data {
                Value::Object(mut map) => map.remove("_federation").ok_or_else(|| {
                    ExecutionError::ShapeMismatch(
                        "_federation missing from downstream response".to_string(),
                    )
                    .into()
                }),
                _ => Err(ExecutionError::ShapeMismatch(
                    "downstream response is not an object".to_string(),
                )
                .into()),
            },
            _ => Ok(data),
        }
    }
}

//! Gateway builder and request pipeline
//!
//! The [`Gateway`] owns the annotated schema, the planner, and the executor,
//! and drives the per-request pipeline: parse the query, plan it, execute
//! the plan tree, and wrap the stitched document (or the error) in the
//! standard GraphQL response envelope. It can be mounted as an Axum router
//! or served directly.
//!
//! Configuration happens through the [`GatewayBuilder`]: one client handle
//! per service, plus optionally one or more pinned schema versions. Services
//! without pinned schemas are introspected at build time, and the merged
//! schema is computed once and shared immutably afterwards.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, GraphQLError, Result};
use crate::executor::{Executor, ServiceClient};
use crate::introspection::IntrospectionResult;
use crate::plan::Planner;
use crate::schema::FederatedSchema;
use crate::selection;

/// GraphQL request from client
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphQLRequest {
    /// GraphQL query string
    #[serde(default)]
    pub query: String,

    /// Operation name (optional)
    #[serde(rename = "operationName", skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,

    /// Variables for the query
    #[serde(default)]
    pub variables: HashMap<String, Value>,
}

/// GraphQL response to client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphQLResponse {
    /// Response data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Errors if any
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<GraphQLError>,
}

impl GraphQLResponse {
    /// Create a successful response
    pub fn success(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    /// Create an error response
    pub fn error(error: GraphQLError) -> Self {
        Self {
            data: None,
            errors: vec![error],
        }
    }
}

/// Main gateway struct - entry point for the library
///
/// # Example
///
/// ```rust,no_run
/// use graphql_federation_gateway::{Gateway, HttpServiceClient};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let gateway = Gateway::builder()
///     .add_service("accounts", Arc::new(HttpServiceClient::new("http://localhost:4001/graphql")))
///     .add_service("reviews", Arc::new(HttpServiceClient::new("http://localhost:4002/graphql")))
///     .build()
///     .await?;
///
/// gateway.serve("0.0.0.0:8080").await?;
/// # Ok(())
/// # }
/// ```
pub struct Gateway {
    schema: Arc<FederatedSchema>,
    planner: Planner,
    executor: Executor,
}

impl Gateway {
    /// Create a new gateway builder
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    /// The merged, annotated schema.
    pub fn schema(&self) -> &FederatedSchema {
        &self.schema
    }

    /// Execute a client request end to end.
    pub async fn execute(&self, request: GraphQLRequest) -> GraphQLResponse {
        self.execute_cancellable(request, CancellationToken::new())
            .await
    }

    /// Execute a client request under an external cancellation signal.
    /// Cancellation aborts outstanding sub-RPCs and surfaces as the
    /// request's terminal error; no partial response is emitted.
    pub async fn execute_cancellable(
        &self,
        request: GraphQLRequest,
        cancel: CancellationToken,
    ) -> GraphQLResponse {
        match self.run(request, cancel).await {
            Ok(data) => GraphQLResponse::success(data),
            Err(err) => {
                warn!(error = %err, "request failed");
                GraphQLResponse::error(err.to_graphql_error())
            }
        }
    }

    #[instrument(skip_all)]
    async fn run(&self, request: GraphQLRequest, cancel: CancellationToken) -> Result<Value> {
        let (kind, selections) = selection::parse_document(
            &request.query,
            &request.variables,
            request.operation_name.as_deref(),
        )?;

        let plan = self.planner.plan(kind, &selections)?;
        debug!(sub_plans = plan.after.len(), "planned request");

        self.executor.execute(&plan, cancel).await
    }

    /// Convert gateway into an Axum router serving `/graphql` and `/health`.
    pub fn into_router(self) -> Router {
        let state = Arc::new(self);
        Router::new()
            .route("/graphql", post(graphql_handler))
            .route("/health", get(health_handler))
            .with_state(state)
    }

    /// Serve the gateway until ctrl-c.
    pub async fn serve(self, addr: &str) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, "federation gateway listening");
        axum::serve(listener, self.into_router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn graphql_handler(
    State(gateway): State<Arc<Gateway>>,
    Json(request): Json<GraphQLRequest>,
) -> Json<GraphQLResponse> {
    Json(gateway.execute(request).await)
}

async fn health_handler(State(gateway): State<Arc<Gateway>>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "services": gateway.schema.services(),
    }))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}

/// Builder for creating a [`Gateway`].
#[derive(Default)]
pub struct GatewayBuilder {
    services: BTreeMap<String, ServiceEntry>,
}

#[derive(Default)]
struct ServiceEntry {
    client: Option<Arc<dyn ServiceClient>>,
    versions: BTreeMap<String, IntrospectionResult>,
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service and its RPC client. The service's schema is
    /// introspected at build time unless versions are pinned explicitly.
    pub fn add_service(mut self, name: impl Into<String>, client: Arc<dyn ServiceClient>) -> Self {
        self.services.entry(name.into()).or_default().client = Some(client);
        self
    }

    /// Pin an introspection document for one version of a service. When a
    /// service reports multiple versions, only structure present in every
    /// version survives the merge.
    pub fn add_service_schema(
        mut self,
        name: impl Into<String>,
        version: impl Into<String>,
        schema: IntrospectionResult,
    ) -> Self {
        self.services
            .entry(name.into())
            .or_default()
            .versions
            .insert(version.into(), schema);
        self
    }

    /// Assemble the merged schema and the executor. Fails on any
    /// schema-configuration error; a gateway never starts with a topology
    /// it cannot route.
    pub async fn build(self) -> Result<Gateway> {
        let mut table: BTreeMap<String, BTreeMap<String, IntrospectionResult>> = BTreeMap::new();
        let mut clients: BTreeMap<String, Arc<dyn ServiceClient>> = BTreeMap::new();

        for (name, entry) in self.services {
            let client = entry
                .client
                .ok_or_else(|| Error::Config(format!("no client configured for service {}", name)))?;

            let versions = if entry.versions.is_empty() {
                info!(service = %name, "introspecting service schema");
                let introspected = client.introspect().await?;
                BTreeMap::from([(String::new(), introspected)])
            } else {
                entry.versions
            };

            table.insert(name.clone(), versions);
            clients.insert(name, client);
        }

        if table.is_empty() {
            return Err(Error::Config("no services configured".to_string()));
        }

        let schema = Arc::new(FederatedSchema::from_versioned(table)?);
        info!(
            services = schema.services().len(),
            types = schema.types().count(),
            "merged federation schema"
        );

        Ok(Gateway {
            planner: Planner::new(schema.clone()),
            executor: Executor::new(schema.clone(), clients),
            schema,
        })
    }
}

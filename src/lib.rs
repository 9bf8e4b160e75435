//! # graphql-federation-gateway
//!
//! A Rust gateway that federates independent GraphQL services behind one
//! unified schema. A client issues one query; the gateway merges the
//! introspected schemas of all downstream services, decomposes the selection
//! set into a tree of sub-queries each owned by a single service, and
//! stitches the sub-results back together along shared federation keys.
//!
//! ## Main Components
//!
//! - [`Gateway`]: the main entry point; builds the merged schema and drives
//!   the parse -> plan -> execute pipeline.
//! - [`FederatedSchema`]: the merged type table, annotated per field with
//!   the services that resolve it and the federation keys of each entry
//!   point.
//! - [`Planner`]: converts a client selection set into a tree of per-service
//!   [`Plan`]s connected by hand-off paths.
//! - [`Executor`]: dispatches plans concurrently, batches federation keys,
//!   and grafts child responses into the parent document.
//! - [`HttpServiceClient`]: GraphQL-over-HTTP implementation of the
//!   [`ServiceClient`] transport seam.
//!
//! ## Federation conventions
//!
//! An object carrying a `_federation` field is federated on the declaring
//! service. A synthetic root type named `Federation` holds entry points
//! named `<service>_<Object>`, each taking one input-object argument whose
//! members are the federation keys that identify instances of `Object` for
//! that service.
//!
//! ## Example
//!
//! ```rust,no_run
//! use graphql_federation_gateway::{Gateway, HttpServiceClient};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = Gateway::builder()
//!         .add_service("accounts", Arc::new(HttpServiceClient::new("http://localhost:4001/graphql")))
//!         .add_service("reviews", Arc::new(HttpServiceClient::new("http://localhost:4002/graphql")))
//!         .build()
//!         .await?;
//!
//!     gateway.serve("0.0.0.0:8080").await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod introspection;
pub mod merge;
pub mod plan;
pub mod schema;
pub mod selection;

pub use client::HttpServiceClient;
pub use error::{Error, ExecutionError, GraphQLError, PlanError, Result, SchemaError};
pub use executor::{Executor, ServiceClient, SubgraphRequest};
pub use gateway::{Gateway, GatewayBuilder, GraphQLRequest, GraphQLResponse};
pub use introspection::{IntrospectionResult, INTROSPECTION_QUERY};
pub use merge::{merge_introspection, MergePolicy};
pub use plan::{Plan, PathSegment, Planner, QueryPlan};
pub use schema::{
    FederatedSchema, FederationEntry, Field, MergedType, ObjectType, TypeRef, FEDERATION_MARKER,
    FEDERATION_TYPE,
};
pub use selection::{parse_document, to_query_string, OperationKind, Selection};

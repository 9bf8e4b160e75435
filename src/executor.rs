//! Distributed plan execution
//!
//! The executor dispatches plan trees as concurrent RPCs. For each child
//! plan it walks the parent's JSON response along the child's path to find
//! hand-off sites, batches the federation keys of all sites into a single
//! entry-point call, and grafts the returned rows back into the sites in
//! order. Sibling plans run concurrently; they address different services
//! and write disjoint regions of the response.
//!
//! Any RPC failure, shape mismatch, missing key, or batch-length mismatch
//! aborts the whole request. Cancellation stops new dispatches, propagates
//! into in-flight RPCs through the token handed to clients, and surfaces as
//! the request's terminal error. Partial results are never returned.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{try_join_all, BoxFuture, FutureExt};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, ExecutionError, Result};
use crate::introspection::IntrospectionResult;
use crate::plan::{path_to_string, PathSegment, Plan, QueryPlan};
use crate::schema::{FederatedSchema, FederationEntry};
use crate::selection::{to_query_string, OperationKind, Selection};

/// A serialized sub-query addressed at one service.
#[derive(Debug, Clone, PartialEq)]
pub struct SubgraphRequest {
    pub kind: OperationKind,
    pub selections: Vec<Selection>,
}

impl SubgraphRequest {
    /// GraphQL text form of the request, for transports that speak
    /// GraphQL-over-HTTP rather than the structured selection tree.
    pub fn to_query(&self) -> String {
        to_query_string(self.kind, &self.selections)
    }
}

/// The gateway's contract with the transport: given a sub-query, produce a
/// JSON document rooted at the requested root type, or an error.
///
/// Implementations must honor the cancellation token for in-flight work.
#[async_trait]
pub trait ServiceClient: Send + Sync {
    /// Fetch the service's schema via the standard introspection query.
    async fn introspect(&self) -> Result<IntrospectionResult>;

    /// Execute a sub-query and return its JSON response.
    async fn dispatch(&self, request: SubgraphRequest, cancel: CancellationToken)
        -> Result<Value>;
}

/// Executes plan trees against a table of per-service clients.
pub struct Executor {
    schema: Arc<FederatedSchema>,
    clients: BTreeMap<String, Arc<dyn ServiceClient>>,
}

impl Executor {
    pub fn new(
        schema: Arc<FederatedSchema>,
        clients: BTreeMap<String, Arc<dyn ServiceClient>>,
    ) -> Self {
        Self { schema, clients }
    }

    /// Execute a planned request and return the stitched JSON document.
    pub async fn execute(&self, plan: &QueryPlan, cancel: CancellationToken) -> Result<Value> {
        let roots = try_join_all(
            plan.after
                .iter()
                .map(|p| self.run_root(p, cancel.clone())),
        )
        .await?;

        let mut data = Map::new();
        for root in roots {
            match root {
                Value::Object(map) => data.extend(map),
                _ => {
                    return Err(ExecutionError::ShapeMismatch(
                        "service response is not an object".to_string(),
                    )
                    .into())
                }
            }
        }
        Ok(Value::Object(data))
    }

    async fn run_root(&self, plan: &Plan, cancel: CancellationToken) -> Result<Value> {
        let kind = if plan.type_name == "Mutation" {
            OperationKind::Mutation
        } else {
            OperationKind::Query
        };
        let request = SubgraphRequest {
            kind,
            selections: plan.selections.clone(),
        };
        let mut value = self.dispatch(&plan.service, request, cancel.clone()).await?;
        self.run_after(&plan.after, &mut value, cancel).await?;
        Ok(value)
    }

    /// Resolve and graft every child plan of one node. The key collection
    /// walks happen first, then all sibling hand-offs (including their own
    /// subtrees) are dispatched concurrently, then the finished rows are
    /// grafted back into the parent in plan order.
    fn run_after<'a>(
        &'a self,
        children: &'a [Plan],
        value: &'a mut Value,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let mut jobs: Vec<(&Plan, &FederationEntry, Vec<Map<String, Value>>)> = Vec::new();
            for child in children {
                let entry = self
                    .schema
                    .entry(&child.service, &child.type_name)
                    .ok_or_else(|| ExecutionError::MissingEntryPoint {
                        service: child.service.clone(),
                        type_name: child.type_name.clone(),
                    })?;
                let sites = collect_keys(&*value, &child.path, entry, &child.type_name)?;
                if sites.is_empty() {
                    continue;
                }
                jobs.push((child, entry, sites));
            }
            if jobs.is_empty() {
                return Ok(());
            }

            let resolved = try_join_all(jobs.iter().map(|(child, entry, sites)| {
                let cancel = cancel.clone();
                async move {
                    let rows = self
                        .dispatch_handoff(child, entry, sites, cancel.clone())
                        .await?;
                    let mut rows = Value::Array(rows);
                    self.run_after(&child.after, &mut rows, cancel).await?;
                    match rows {
                        Value::Array(rows) => Ok::<_, Error>(rows),
                        _ => Err(ExecutionError::ShapeMismatch(
                            "child rows are not a list".to_string(),
                        )
                        .into()),
                    }
                }
            }))
            .await?;

            for ((child, entry, _), rows) in jobs.iter().zip(resolved) {
                graft(value, &child.path, rows, entry)?;
            }
            Ok(())
        }
        .boxed()
    }

    /// Dispatch one batched hand-off through the child's entry point and
    /// return exactly one row per site, in site order.
    async fn dispatch_handoff(
        &self,
        child: &Plan,
        entry: &FederationEntry,
        sites: &[Map<String, Value>],
        cancel: CancellationToken,
    ) -> Result<Vec<Value>> {
        let keys = Value::Array(sites.iter().cloned().map(Value::Object).collect());
        let mut args = Map::new();
        args.insert(entry.argument.clone(), keys);

        let selection = Selection {
            name: entry.field.clone(),
            alias: entry.field.clone(),
            args,
            selections: child.selections.clone(),
        };

        debug!(
            service = %child.service,
            entry = %entry.field,
            path = %path_to_string(&child.path),
            sites = sites.len(),
            "dispatching hand-off"
        );

        let response = self
            .dispatch(
                &child.service,
                SubgraphRequest {
                    kind: OperationKind::Federation,
                    selections: vec![selection],
                },
                cancel,
            )
            .await?;

        let Value::Object(mut map) = response else {
            return Err(ExecutionError::ShapeMismatch(format!(
                "{} response is not an object",
                entry.field
            ))
            .into());
        };
        let Some(rows) = map.remove(&entry.field) else {
            return Err(ExecutionError::ShapeMismatch(format!(
                "{} missing from federation response",
                entry.field
            ))
            .into());
        };
        let Value::Array(rows) = rows else {
            return Err(ExecutionError::ShapeMismatch(format!(
                "{} response is not a list",
                entry.field
            ))
            .into());
        };
        if rows.len() != sites.len() {
            return Err(ExecutionError::BatchLength {
                entry: entry.field.clone(),
                expected: sites.len(),
                actual: rows.len(),
            }
            .into());
        }
        Ok(rows)
    }

    async fn dispatch(
        &self,
        service: &str,
        request: SubgraphRequest,
        cancel: CancellationToken,
    ) -> Result<Value> {
        if cancel.is_cancelled() {
            return Err(ExecutionError::Cancelled.into());
        }
        let client = self
            .clients
            .get(service)
            .ok_or_else(|| ExecutionError::UnknownService(service.to_string()))?;

        let rpc = client.dispatch(request, cancel.clone());
        tokio::select! {
            _ = cancel.cancelled() => Err(ExecutionError::Cancelled.into()),
            result = rpc => result,
        }
    }
}

/// Walk `value` along `path` and collect the federation keys of every
/// hand-off site, in deterministic depth-first order. Arrays fan out
/// implicitly; `?` segments require one. Null values mean the parent field
/// was optional and absent, which simply produces no site.
fn collect_keys(
    value: &Value,
    path: &[PathSegment],
    entry: &FederationEntry,
    type_name: &str,
) -> std::result::Result<Vec<Map<String, Value>>, ExecutionError> {
    let mut sites = Vec::new();
    collect_into(value, path, entry, type_name, &mut sites)?;
    Ok(sites)
}

fn collect_into(
    value: &Value,
    path: &[PathSegment],
    entry: &FederationEntry,
    type_name: &str,
    sites: &mut Vec<Map<String, Value>>,
) -> std::result::Result<(), ExecutionError> {
    match path.split_first() {
        None => match value {
            Value::Null => Ok(()),
            Value::Array(items) => {
                for item in items {
                    collect_into(item, path, entry, type_name, sites)?;
                }
                Ok(())
            }
            Value::Object(map) => {
                let mut keys = Map::new();
                for key in &entry.keys {
                    match map.get(key) {
                        Some(v) if !v.is_null() => {
                            keys.insert(key.clone(), v.clone());
                        }
                        _ => {
                            return Err(ExecutionError::MissingKey {
                                key: key.clone(),
                                type_name: type_name.to_string(),
                            })
                        }
                    }
                }
                sites.push(keys);
                Ok(())
            }
            _ => Err(ExecutionError::ShapeMismatch(
                "hand-off site is not an object".to_string(),
            )),
        },
        Some((PathSegment::Each, rest)) => match value {
            Value::Null => Ok(()),
            Value::Array(items) => {
                for item in items {
                    collect_into(item, rest, entry, type_name, sites)?;
                }
                Ok(())
            }
            _ => Err(ExecutionError::ShapeMismatch(
                "expected a list at '?' path segment".to_string(),
            )),
        },
        Some((PathSegment::Field(name), rest)) => match value {
            Value::Null => Ok(()),
            Value::Array(items) => {
                for item in items {
                    collect_into(item, path, entry, type_name, sites)?;
                }
                Ok(())
            }
            Value::Object(map) => match map.get(name) {
                Some(inner) => collect_into(inner, rest, entry, type_name, sites),
                None => Err(ExecutionError::ShapeMismatch(format!(
                    "missing field {} while walking hand-off path",
                    name
                ))),
            },
            _ => Err(ExecutionError::ShapeMismatch(format!(
                "cannot descend into {} on a non-object value",
                name
            ))),
        },
    }
}

/// Merge child rows into the hand-off sites found by the same walk that
/// collected the keys. Overlapping federation keys must agree; other child
/// fields overwrite or augment the site.
fn graft(
    value: &mut Value,
    path: &[PathSegment],
    rows: Vec<Value>,
    entry: &FederationEntry,
) -> std::result::Result<(), ExecutionError> {
    let mut rows = rows.into_iter();
    graft_into(value, path, &mut rows, entry)?;
    if rows.next().is_some() {
        return Err(ExecutionError::ShapeMismatch(
            "more child rows than hand-off sites".to_string(),
        ));
    }
    Ok(())
}

fn graft_into(
    value: &mut Value,
    path: &[PathSegment],
    rows: &mut std::vec::IntoIter<Value>,
    entry: &FederationEntry,
) -> std::result::Result<(), ExecutionError> {
    match path.split_first() {
        None => match value {
            Value::Null => Ok(()),
            Value::Array(items) => {
                for item in items {
                    graft_into(item, path, rows, entry)?;
                }
                Ok(())
            }
            Value::Object(site) => {
                let row = rows.next().ok_or_else(|| {
                    ExecutionError::ShapeMismatch(
                        "fewer child rows than hand-off sites".to_string(),
                    )
                })?;
                let Value::Object(fields) = row else {
                    return Err(ExecutionError::ShapeMismatch(
                        "child row is not an object".to_string(),
                    ));
                };
                for (name, field_value) in fields {
                    if let Some(existing) = site.get(&name) {
                        if entry.keys.contains(&name) && *existing != field_value {
                            return Err(ExecutionError::KeyMismatch(name));
                        }
                    }
                    site.insert(name, field_value);
                }
                Ok(())
            }
            _ => Err(ExecutionError::ShapeMismatch(
                "hand-off site is not an object".to_string(),
            )),
        },
        Some((PathSegment::Each, rest)) => match value {
            Value::Null => Ok(()),
            Value::Array(items) => {
                for item in items {
                    graft_into(item, rest, rows, entry)?;
                }
                Ok(())
            }
            _ => Err(ExecutionError::ShapeMismatch(
                "expected a list at '?' path segment".to_string(),
            )),
        },
        Some((PathSegment::Field(name), rest)) => match value {
            Value::Null => Ok(()),
            Value::Array(items) => {
                for item in items {
                    graft_into(item, path, rows, entry)?;
                }
                Ok(())
            }
            Value::Object(map) => match map.get_mut(name) {
                Some(inner) => graft_into(inner, rest, rows, entry),
                None => Err(ExecutionError::ShapeMismatch(format!(
                    "missing field {} while walking hand-off path",
                    name
                ))),
            },
            _ => Err(ExecutionError::ShapeMismatch(format!(
                "cannot descend into {} on a non-object value",
                name
            ))),
        },
    }
}

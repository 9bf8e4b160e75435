//! End-to-end execution against the in-process fixture services.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::*;
use graphql_federation_gateway::{
    Error, ExecutionError, Executor, IntrospectionResult, OperationKind, Planner, Result,
    ServiceClient, SubgraphRequest,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

fn executor_with(
    clients: BTreeMap<String, Arc<dyn ServiceClient>>,
) -> (Planner, Executor) {
    let schema = fixture_schema();
    (
        Planner::new(schema.clone()),
        Executor::new(schema, clients),
    )
}

async fn run(query: &str) -> Result<Value> {
    let (planner, executor) = executor_with(fixture_clients());
    let plan = planner.plan(OperationKind::Query, &must_parse(query)).unwrap();
    executor.execute(&plan, CancellationToken::new()).await
}

#[tokio::test]
async fn test_execute_kitchen_sink() {
    let result = run(KITCHEN_SINK).await.unwrap();
    assert_eq!(result, kitchen_sink_output());
}

#[tokio::test]
async fn test_grafting_preserves_parent_key_values() {
    let result = run(KITCHEN_SINK).await.unwrap();
    assert_eq!(result["s1fff"][0]["federationKey"], json!("jimbo"));
    assert_eq!(result["s1fff"][1]["federationKey"], json!("bob"));
}

#[tokio::test]
async fn test_single_service_query_with_arguments() {
    let result = run("{ barsFromFederationKeys(keys: [7, 21]) { id s1baz } }")
        .await
        .unwrap();
    assert_eq!(
        result,
        json!({
            "barsFromFederationKeys": [
                {"id": 7, "s1baz": "7"},
                {"id": 21, "s1baz": "21"}
            ]
        })
    );
}

#[tokio::test]
async fn test_query_rooted_at_other_service() {
    let result = run(r#"{ foosFromFederationKeys(keys: ["zed"]) { s2ok name } }"#)
        .await
        .unwrap();
    assert_eq!(
        result,
        json!({
            "foosFromFederationKeys": [
                {"s2ok": 3, "name": "zed"}
            ]
        })
    );
}

#[tokio::test]
async fn test_unknown_service_is_fatal() {
    let clients: BTreeMap<String, Arc<dyn ServiceClient>> = BTreeMap::from([(
        "schema1".to_string(),
        Arc::new(Schema1Client) as Arc<dyn ServiceClient>,
    )]);
    let (planner, executor) = executor_with(clients);
    let plan = planner
        .plan(OperationKind::Query, &must_parse(KITCHEN_SINK))
        .unwrap();

    let err = executor
        .execute(&plan, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Execution(ExecutionError::UnknownService(service)) if service == "schema2"
    ));
}

/// Returns one row fewer than the number of keys it was sent.
struct ShortBatchClient;

#[async_trait]
impl ServiceClient for ShortBatchClient {
    async fn introspect(&self) -> Result<IntrospectionResult> {
        Ok(schema2_introspection())
    }

    async fn dispatch(
        &self,
        request: SubgraphRequest,
        cancel: CancellationToken,
    ) -> Result<Value> {
        let mut response = Schema2Client.dispatch(request, cancel).await?;
        if let Value::Object(map) = &mut response {
            for value in map.values_mut() {
                if let Value::Array(rows) = value {
                    rows.pop();
                }
            }
        }
        Ok(response)
    }
}

#[tokio::test]
async fn test_batch_length_mismatch_is_fatal() {
    let clients: BTreeMap<String, Arc<dyn ServiceClient>> = BTreeMap::from([
        (
            "schema1".to_string(),
            Arc::new(Schema1Client) as Arc<dyn ServiceClient>,
        ),
        (
            "schema2".to_string(),
            Arc::new(ShortBatchClient) as Arc<dyn ServiceClient>,
        ),
    ]);
    let (planner, executor) = executor_with(clients);
    let plan = planner
        .plan(OperationKind::Query, &must_parse("{ s1fff { s2ok } }"))
        .unwrap();

    let err = executor
        .execute(&plan, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Execution(ExecutionError::BatchLength {
            expected: 2,
            actual: 1,
            ..
        })
    ));
}

/// Ignores the requested selections and answers with a fixed document that
/// lacks the injected federation key.
struct KeylessClient;

#[async_trait]
impl ServiceClient for KeylessClient {
    async fn introspect(&self) -> Result<IntrospectionResult> {
        Ok(schema1_introspection())
    }

    async fn dispatch(
        &self,
        _request: SubgraphRequest,
        _cancel: CancellationToken,
    ) -> Result<Value> {
        Ok(json!({"s1fff": [{"s1hmm": "jimbo!!!"}]}))
    }
}

#[tokio::test]
async fn test_missing_handoff_key_is_fatal() {
    let clients: BTreeMap<String, Arc<dyn ServiceClient>> = BTreeMap::from([
        (
            "schema1".to_string(),
            Arc::new(KeylessClient) as Arc<dyn ServiceClient>,
        ),
        (
            "schema2".to_string(),
            Arc::new(Schema2Client) as Arc<dyn ServiceClient>,
        ),
    ]);
    let (planner, executor) = executor_with(clients);
    let plan = planner
        .plan(OperationKind::Query, &must_parse("{ s1fff { s1hmm s2ok } }"))
        .unwrap();

    let err = executor
        .execute(&plan, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Execution(ExecutionError::MissingKey { key, .. }) if key == "federationKey"
    ));
}

/// Fails every dispatch the way a broken downstream would.
struct FailingClient;

#[async_trait]
impl ServiceClient for FailingClient {
    async fn introspect(&self) -> Result<IntrospectionResult> {
        Ok(schema2_introspection())
    }

    async fn dispatch(
        &self,
        _request: SubgraphRequest,
        _cancel: CancellationToken,
    ) -> Result<Value> {
        Err(ExecutionError::Downstream {
            service: "schema2".to_string(),
            message: "boom".to_string(),
        }
        .into())
    }
}

#[tokio::test]
async fn test_downstream_error_propagates() {
    let clients: BTreeMap<String, Arc<dyn ServiceClient>> = BTreeMap::from([
        (
            "schema1".to_string(),
            Arc::new(Schema1Client) as Arc<dyn ServiceClient>,
        ),
        (
            "schema2".to_string(),
            Arc::new(FailingClient) as Arc<dyn ServiceClient>,
        ),
    ]);
    let (planner, executor) = executor_with(clients);
    let plan = planner
        .plan(OperationKind::Query, &must_parse("{ s1fff { s2ok } }"))
        .unwrap();

    let err = executor
        .execute(&plan, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Execution(ExecutionError::Downstream { message, .. }) if message == "boom"
    ));
}

/// Never answers; used to prove cancellation interrupts in-flight RPCs.
struct HangingClient;

#[async_trait]
impl ServiceClient for HangingClient {
    async fn introspect(&self) -> Result<IntrospectionResult> {
        Ok(schema1_introspection())
    }

    async fn dispatch(
        &self,
        _request: SubgraphRequest,
        _cancel: CancellationToken,
    ) -> Result<Value> {
        futures::future::pending().await
    }
}

#[tokio::test]
async fn test_cancelled_before_dispatch() {
    let (planner, executor) = executor_with(fixture_clients());
    let plan = planner
        .plan(OperationKind::Query, &must_parse("{ s1f { name } }"))
        .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = executor.execute(&plan, cancel).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Execution(ExecutionError::Cancelled)
    ));
}

#[tokio::test]
async fn test_cancellation_interrupts_in_flight_rpc() {
    let clients: BTreeMap<String, Arc<dyn ServiceClient>> = BTreeMap::from([
        (
            "schema1".to_string(),
            Arc::new(HangingClient) as Arc<dyn ServiceClient>,
        ),
        (
            "schema2".to_string(),
            Arc::new(Schema2Client) as Arc<dyn ServiceClient>,
        ),
    ]);
    let (planner, executor) = executor_with(clients);
    let plan = planner
        .plan(OperationKind::Query, &must_parse("{ s1f { name } }"))
        .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = executor.execute(&plan, cancel).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Execution(ExecutionError::Cancelled)
    ));
}

//! Shared fixtures: two in-process services federating `foo` and `bar`.
//!
//! `schema1` owns foos (and extends bars), `schema2` extends foos (and owns
//! bars' keys). Hand-offs run in both directions: foo hops from schema1 to
//! schema2 through `schema2_foo`, bar hops back through `schema1_bar`.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use graphql_federation_gateway::{
    parse_document, FederatedSchema, Gateway, IntrospectionResult, OperationKind, Result,
    Selection, ServiceClient, SubgraphRequest,
};

pub const KITCHEN_SINK: &str = "{
    s1fff {
        a: s1nest { b: s1nest { c: s1nest { s2ok } } }
        s1hmm
        s2ok
        s2bar {
            id
            s1baz
        }
        s1nest {
            name
        }
        s2nest {
            name
        }
    }
}";

pub fn kitchen_sink_output() -> Value {
    json!({
        "s1fff": [
            {
                "a": {"b": {"c": {"federationKey": "jimbo", "s2ok": 5}}},
                "s1hmm": "jimbo!!!",
                "s2ok": 5,
                "s2bar": {"id": 14, "federationKey": 14, "s1baz": "14"},
                "s1nest": {"name": "jimbo"},
                "s2nest": {"name": "jimbo"},
                "federationKey": "jimbo"
            },
            {
                "a": {"b": {"c": {"federationKey": "bob", "s2ok": 3}}},
                "s1hmm": "bob!!!",
                "s2ok": 3,
                "s2bar": {"id": 10, "federationKey": 10, "s1baz": "10"},
                "s1nest": {"name": "bob"},
                "s2nest": {"name": "bob"},
                "federationKey": "bob"
            }
        ]
    })
}

pub fn must_parse(query: &str) -> Vec<Selection> {
    parse_document(query, &HashMap::new(), None).unwrap().1
}

// introspection JSON builders

pub fn named(kind: &str, name: &str) -> Value {
    json!({"kind": kind, "name": name, "ofType": null})
}

pub fn list_of(inner: Value) -> Value {
    json!({"kind": "LIST", "name": null, "ofType": inner})
}

pub fn non_null(inner: Value) -> Value {
    json!({"kind": "NON_NULL", "name": null, "ofType": inner})
}

pub fn field(name: &str, ty: Value) -> Value {
    json!({"name": name, "type": ty})
}

pub fn field_with_args(name: &str, ty: Value, args: Value) -> Value {
    json!({"name": name, "type": ty, "args": args})
}

pub fn arg(name: &str, ty: Value) -> Value {
    json!({"name": name, "type": ty})
}

pub fn introspection(types: Value) -> IntrospectionResult {
    serde_json::from_value(json!({"__schema": {"types": types}})).unwrap()
}

pub fn schema1_introspection() -> IntrospectionResult {
    introspection(json!([
        {"kind": "OBJECT", "name": "Query", "fields": [
            field("s1f", named("OBJECT", "foo")),
            field("s1fff", list_of(named("OBJECT", "foo"))),
            field_with_args(
                "barsFromFederationKeys",
                list_of(named("OBJECT", "bar")),
                json!([arg("keys", list_of(named("SCALAR", "int64")))])
            )
        ]},
        {"kind": "OBJECT", "name": "foo", "fields": [
            field("name", named("SCALAR", "string")),
            field("federationKey", named("SCALAR", "string")),
            field("s1hmm", named("SCALAR", "string")),
            field("s1nest", named("OBJECT", "foo")),
            field("_federation", named("SCALAR", "string"))
        ]},
        {"kind": "OBJECT", "name": "bar", "fields": [
            field("id", named("SCALAR", "int64")),
            field("s1baz", named("SCALAR", "string")),
            field("_federation", named("SCALAR", "string"))
        ]},
        {"kind": "OBJECT", "name": "Federation", "fields": [
            field_with_args(
                "schema1_bar",
                list_of(named("OBJECT", "bar")),
                json!([arg("keys", list_of(non_null(named("INPUT_OBJECT", "BarKeys"))))])
            )
        ]},
        {"kind": "INPUT_OBJECT", "name": "BarKeys", "inputFields": [
            arg("federationKey", named("SCALAR", "int64"))
        ]},
        {"kind": "SCALAR", "name": "string"},
        {"kind": "SCALAR", "name": "int64"}
    ]))
}

pub fn schema2_introspection() -> IntrospectionResult {
    introspection(json!([
        {"kind": "OBJECT", "name": "Query", "fields": [
            field_with_args(
                "foosFromFederationKeys",
                list_of(named("OBJECT", "foo")),
                json!([arg("keys", list_of(named("SCALAR", "string")))])
            )
        ]},
        {"kind": "OBJECT", "name": "foo", "fields": [
            field("name", named("SCALAR", "string")),
            field("s2ok", named("SCALAR", "int")),
            field("s2bar", named("OBJECT", "bar")),
            field("s2nest", named("OBJECT", "foo")),
            field("_federation", named("SCALAR", "string"))
        ]},
        {"kind": "OBJECT", "name": "bar", "fields": [
            field("id", named("SCALAR", "int64")),
            field("federationKey", named("SCALAR", "int64")),
            field("_federation", named("SCALAR", "string"))
        ]},
        {"kind": "OBJECT", "name": "Federation", "fields": [
            field_with_args(
                "schema2_foo",
                list_of(named("OBJECT", "foo")),
                json!([arg("keys", list_of(non_null(named("INPUT_OBJECT", "FooKeys"))))])
            )
        ]},
        {"kind": "INPUT_OBJECT", "name": "FooKeys", "inputFields": [
            arg("federationKey", named("SCALAR", "string"))
        ]},
        {"kind": "SCALAR", "name": "string"},
        {"kind": "SCALAR", "name": "int64"},
        {"kind": "SCALAR", "name": "int"}
    ]))
}

pub fn fixture_schemas() -> BTreeMap<String, IntrospectionResult> {
    BTreeMap::from([
        ("schema1".to_string(), schema1_introspection()),
        ("schema2".to_string(), schema2_introspection()),
    ])
}

pub fn fixture_schema() -> Arc<FederatedSchema> {
    Arc::new(FederatedSchema::from_services(fixture_schemas()).unwrap())
}

pub fn fixture_clients() -> BTreeMap<String, Arc<dyn ServiceClient>> {
    BTreeMap::from([
        (
            "schema1".to_string(),
            Arc::new(Schema1Client) as Arc<dyn ServiceClient>,
        ),
        (
            "schema2".to_string(),
            Arc::new(Schema2Client) as Arc<dyn ServiceClient>,
        ),
    ])
}

pub async fn fixture_gateway() -> Gateway {
    Gateway::builder()
        .add_service("schema1", Arc::new(Schema1Client))
        .add_service("schema2", Arc::new(Schema2Client))
        .build()
        .await
        .unwrap()
}

// schema1: owns foos, extends bars

pub struct Schema1Client;

#[async_trait]
impl ServiceClient for Schema1Client {
    async fn introspect(&self) -> Result<IntrospectionResult> {
        Ok(schema1_introspection())
    }

    async fn dispatch(
        &self,
        request: SubgraphRequest,
        _cancel: CancellationToken,
    ) -> Result<Value> {
        let mut out = Map::new();
        for sel in &request.selections {
            let value = match (request.kind, sel.name.as_str()) {
                (OperationKind::Query, "s1f") => foo1("jimbob", &sel.selections),
                (OperationKind::Query, "s1fff") => Value::Array(vec![
                    foo1("jimbo", &sel.selections),
                    foo1("bob", &sel.selections),
                ]),
                (OperationKind::Query, "barsFromFederationKeys") => {
                    let keys = sel.args["keys"].as_array().expect("keys must be a list");
                    Value::Array(
                        keys.iter()
                            .map(|k| bar1(k.as_i64().expect("int64 key"), &sel.selections))
                            .collect(),
                    )
                }
                (OperationKind::Federation, "schema1_bar") => {
                    let keys = sel.args["keys"].as_array().expect("keys must be a list");
                    Value::Array(
                        keys.iter()
                            .map(|k| {
                                bar1(
                                    k["federationKey"].as_i64().expect("int64 key"),
                                    &sel.selections,
                                )
                            })
                            .collect(),
                    )
                }
                (kind, other) => panic!("schema1 cannot resolve {:?} field {}", kind, other),
            };
            out.insert(sel.alias.clone(), value);
        }
        Ok(Value::Object(out))
    }
}

fn foo1(name: &str, selections: &[Selection]) -> Value {
    let mut out = Map::new();
    for sel in selections {
        let value = match sel.name.as_str() {
            "name" => json!(name),
            "federationKey" => json!(name),
            "s1hmm" => json!(format!("{}!!!", name)),
            "s1nest" => foo1(name, &sel.selections),
            other => panic!("schema1 cannot resolve foo.{}", other),
        };
        out.insert(sel.alias.clone(), value);
    }
    Value::Object(out)
}

fn bar1(id: i64, selections: &[Selection]) -> Value {
    let mut out = Map::new();
    for sel in selections {
        let value = match sel.name.as_str() {
            "id" => json!(id),
            "s1baz" => json!(id.to_string()),
            other => panic!("schema1 cannot resolve bar.{}", other),
        };
        out.insert(sel.alias.clone(), value);
    }
    Value::Object(out)
}

// schema2: extends foos, owns bar keys

pub struct Schema2Client;

#[async_trait]
impl ServiceClient for Schema2Client {
    async fn introspect(&self) -> Result<IntrospectionResult> {
        Ok(schema2_introspection())
    }

    async fn dispatch(
        &self,
        request: SubgraphRequest,
        _cancel: CancellationToken,
    ) -> Result<Value> {
        let mut out = Map::new();
        for sel in &request.selections {
            let value = match (request.kind, sel.name.as_str()) {
                (OperationKind::Query, "foosFromFederationKeys") => {
                    let keys = sel.args["keys"].as_array().expect("keys must be a list");
                    Value::Array(
                        keys.iter()
                            .map(|k| foo2(k.as_str().expect("string key"), &sel.selections))
                            .collect(),
                    )
                }
                (OperationKind::Federation, "schema2_foo") => {
                    let keys = sel.args["keys"].as_array().expect("keys must be a list");
                    Value::Array(
                        keys.iter()
                            .map(|k| {
                                foo2(
                                    k["federationKey"].as_str().expect("string key"),
                                    &sel.selections,
                                )
                            })
                            .collect(),
                    )
                }
                (kind, other) => panic!("schema2 cannot resolve {:?} field {}", kind, other),
            };
            out.insert(sel.alias.clone(), value);
        }
        Ok(Value::Object(out))
    }
}

fn foo2(name: &str, selections: &[Selection]) -> Value {
    let mut out = Map::new();
    for sel in selections {
        let value = match sel.name.as_str() {
            "name" => json!(name),
            "s2ok" => json!(name.len()),
            "s2bar" => bar2((name.len() * 2 + 4) as i64, &sel.selections),
            "s2nest" => foo2(name, &sel.selections),
            other => panic!("schema2 cannot resolve foo.{}", other),
        };
        out.insert(sel.alias.clone(), value);
    }
    Value::Object(out)
}

fn bar2(id: i64, selections: &[Selection]) -> Value {
    let mut out = Map::new();
    for sel in selections {
        let value = match sel.name.as_str() {
            "id" => json!(id),
            "federationKey" => json!(id),
            other => panic!("schema2 cannot resolve bar.{}", other),
        };
        out.insert(sel.alias.clone(), value);
    }
    Value::Object(out)
}

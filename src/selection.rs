//! Client selection trees and their GraphQL text form
//!
//! The gateway's contract with the parser is "give me a tree of
//! `Selection{name, alias, args, children}`". [`parse_document`] fulfils it
//! on top of `async-graphql-parser`, resolving variables into plain JSON
//! values and reducing the language to fields (no fragments at this layer).
//!
//! [`to_query_string`] is the reverse direction: a plan's selection tree is
//! serialized back into selection-set text before it is dispatched to the
//! owning service. Aliases are preserved so grafting by alias on return is
//! unambiguous, and federation hand-offs are rooted at the reserved
//! `_federation` field.

use std::collections::HashMap;

use async_graphql_parser::types::{
    DocumentOperations, OperationDefinition, OperationType, Selection as AstSelection,
    SelectionSet,
};
use async_graphql_parser::Positioned;
use async_graphql_value::ConstValue;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Which root a selection set addresses when dispatched to a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
    /// The synthetic `Federation` root used for hand-off sub-queries.
    Federation,
}

/// A parsed request node. Children form a tree; `alias` equals `name` when
/// the client did not alias the field.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub name: String,
    pub alias: String,
    pub args: Map<String, Value>,
    pub selections: Vec<Selection>,
}

impl Selection {
    /// A bare field selection with no alias, arguments, or children.
    pub fn field(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            alias: name.clone(),
            name,
            args: Map::new(),
            selections: Vec::new(),
        }
    }
}

/// Parse a query document into the operation kind and its selection tree.
///
/// Variables are substituted eagerly so the rest of the gateway only ever
/// sees concrete JSON argument values. Multi-operation documents require
/// `operation_name`; fragments and subscriptions are rejected.
pub fn parse_document(
    query: &str,
    variables: &HashMap<String, Value>,
    operation_name: Option<&str>,
) -> Result<(OperationKind, Vec<Selection>)> {
    let doc = async_graphql_parser::parse_query(query)
        .map_err(|e| Error::InvalidRequest(e.to_string()))?;

    if !doc.fragments.is_empty() {
        return Err(Error::InvalidRequest(
            "fragments are not supported".to_string(),
        ));
    }

    let operation: &Positioned<OperationDefinition> = match (&doc.operations, operation_name) {
        (DocumentOperations::Single(op), _) => op,
        (DocumentOperations::Multiple(ops), Some(name)) => ops
            .iter()
            .find(|(n, _)| n.as_str() == name)
            .map(|(_, op)| op)
            .ok_or_else(|| Error::InvalidRequest(format!("operation {} not found", name)))?,
        (DocumentOperations::Multiple(_), None) => {
            return Err(Error::InvalidRequest(
                "operationName is required for multi-operation documents".to_string(),
            ))
        }
    };

    let kind = match operation.node.ty {
        OperationType::Query => OperationKind::Query,
        OperationType::Mutation => OperationKind::Mutation,
        OperationType::Subscription => {
            return Err(Error::InvalidRequest(
                "subscriptions are not supported".to_string(),
            ))
        }
    };

    let selections = convert_set(&operation.node.selection_set.node, variables)?;
    Ok((kind, selections))
}

fn convert_set(set: &SelectionSet, variables: &HashMap<String, Value>) -> Result<Vec<Selection>> {
    let mut out = Vec::with_capacity(set.items.len());
    for item in &set.items {
        match &item.node {
            AstSelection::Field(field) => {
                let field = &field.node;
                let name = field.name.node.to_string();
                let alias = field
                    .alias
                    .as_ref()
                    .map(|a| a.node.to_string())
                    .unwrap_or_else(|| name.clone());

                let mut args = Map::new();
                for (arg_name, arg_value) in &field.arguments {
                    let value = arg_value.node.clone().into_const_with(|var| {
                        variables
                            .get(var.as_str())
                            .cloned()
                            .ok_or_else(|| {
                                Error::InvalidRequest(format!("undefined variable ${}", var))
                            })
                            .and_then(|v| ConstValue::from_json(v).map_err(Error::from))
                    })?;
                    args.insert(arg_name.node.to_string(), value.into_json()?);
                }

                out.push(Selection {
                    name,
                    alias,
                    args,
                    selections: convert_set(&field.selection_set.node, variables)?,
                });
            }
            AstSelection::FragmentSpread(_) | AstSelection::InlineFragment(_) => {
                return Err(Error::InvalidRequest(
                    "fragments are not supported".to_string(),
                ))
            }
        }
    }
    Ok(out)
}

/// Serialize a selection tree into GraphQL selection-set text addressed at
/// the given root.
pub fn to_query_string(kind: OperationKind, selections: &[Selection]) -> String {
    let mut out = String::new();
    match kind {
        OperationKind::Query => write_set(&mut out, selections),
        OperationKind::Mutation => {
            out.push_str("mutation ");
            write_set(&mut out, selections);
        }
        OperationKind::Federation => {
            out.push_str("{ _federation ");
            write_set(&mut out, selections);
            out.push_str(" }");
        }
    }
    out
}

fn write_set(out: &mut String, selections: &[Selection]) {
    out.push('{');
    for sel in selections {
        out.push(' ');
        write_selection(out, sel);
    }
    out.push_str(" }");
}

fn write_selection(out: &mut String, sel: &Selection) {
    if sel.alias != sel.name {
        out.push_str(&sel.alias);
        out.push_str(": ");
    }
    out.push_str(&sel.name);

    if !sel.args.is_empty() {
        out.push('(');
        for (i, (name, value)) in sel.args.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(name);
            out.push_str(": ");
            write_value(out, value);
        }
        out.push(')');
    }

    if !sel.selections.is_empty() {
        out.push(' ');
        write_set(out, &sel.selections);
    }
}

/// Render a JSON value as a GraphQL input literal. Object keys are bare
/// names, everything else matches JSON syntax.
fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(key);
                out.push_str(": ");
                write_value(out, item);
            }
            out.push('}');
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

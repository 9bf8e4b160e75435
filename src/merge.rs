//! Structural merging of introspection documents
//!
//! Two policies cover the two axes of a service topology. Versions of one
//! service are merged by [`MergePolicy::Intersection`]: only structure
//! present in every version survives, so the planner can never route a field
//! to a version that lacks it. Distinct services are merged by
//! [`MergePolicy::Union`]: every type and field survives, and same-named
//! fields must agree structurally or the merge fails.
//!
//! Merging happens on the wire model; the normalizer in [`crate::schema`]
//! turns the merged document into the gateway's type table afterwards.

use std::collections::BTreeMap;

use crate::error::SchemaError;
use crate::introspection::{
    IntrospectionField, IntrospectionInputField, IntrospectionResult, IntrospectionSchema,
    IntrospectionType, IntrospectionTypeRef,
};

/// How overlapping declarations are reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Keep only entries present in every document (versions of one service).
    Intersection,
    /// Keep every entry; overlapping entries must agree (across services).
    Union,
}

/// Merge a slice of introspection documents under the given policy.
///
/// Output ordering is canonical (types, fields, arguments, input fields,
/// union members, and enum values all sorted by name) so merging the same
/// inputs always yields structurally equal documents.
pub fn merge_introspection(
    documents: &[IntrospectionResult],
    policy: MergePolicy,
) -> Result<IntrospectionResult, SchemaError> {
    let mut merged: Option<BTreeMap<String, IntrospectionType>> = None;

    for doc in documents {
        let table = type_table(doc)?;
        merged = Some(match merged {
            None => table,
            Some(acc) => match policy {
                MergePolicy::Union => union(acc, table)?,
                MergePolicy::Intersection => intersection(acc, table),
            },
        });
    }

    let mut types: Vec<IntrospectionType> = merged.unwrap_or_default().into_values().collect();
    for typ in &mut types {
        canonicalize(typ);
    }

    Ok(IntrospectionResult {
        schema: IntrospectionSchema { types },
    })
}

/// Index one document by type name, rejecting duplicate declarations.
fn type_table(
    doc: &IntrospectionResult,
) -> Result<BTreeMap<String, IntrospectionType>, SchemaError> {
    let mut table = BTreeMap::new();
    for typ in &doc.schema.types {
        if table.insert(typ.name.clone(), typ.clone()).is_some() {
            return Err(SchemaError::DuplicateType(typ.name.clone()));
        }
    }
    Ok(table)
}

fn union(
    mut acc: BTreeMap<String, IntrospectionType>,
    other: BTreeMap<String, IntrospectionType>,
) -> Result<BTreeMap<String, IntrospectionType>, SchemaError> {
    for (name, typ) in other {
        match acc.get_mut(&name) {
            None => {
                acc.insert(name, typ);
            }
            Some(existing) => union_type(existing, &typ)?,
        }
    }
    Ok(acc)
}

fn union_type(into: &mut IntrospectionType, from: &IntrospectionType) -> Result<(), SchemaError> {
    if into.kind != from.kind {
        return Err(SchemaError::KindConflict(into.name.clone()));
    }

    for field in &from.fields {
        match into.fields.iter().find(|f| f.name == field.name) {
            Some(existing) => {
                if existing.ty != field.ty || !same_args(&existing.args, &field.args) {
                    return Err(SchemaError::TypeConflict {
                        type_name: into.name.clone(),
                        field: field.name.clone(),
                    });
                }
            }
            None => into.fields.push(field.clone()),
        }
    }

    for input in &from.input_fields {
        match into.input_fields.iter().find(|f| f.name == input.name) {
            Some(existing) => {
                if existing.ty != input.ty {
                    return Err(SchemaError::TypeConflict {
                        type_name: into.name.clone(),
                        field: input.name.clone(),
                    });
                }
            }
            None => into.input_fields.push(input.clone()),
        }
    }

    for member in &from.possible_types {
        if !into
            .possible_types
            .iter()
            .any(|m| m.root().name == member.root().name)
        {
            into.possible_types.push(member.clone());
        }
    }

    for value in &from.enum_values {
        if !into.enum_values.iter().any(|v| v.name == value.name) {
            into.enum_values.push(value.clone());
        }
    }

    Ok(())
}

fn intersection(
    acc: BTreeMap<String, IntrospectionType>,
    other: BTreeMap<String, IntrospectionType>,
) -> BTreeMap<String, IntrospectionType> {
    let mut out = BTreeMap::new();
    for (name, typ) in acc {
        if let Some(other_typ) = other.get(&name) {
            if let Some(common) = intersect_type(&typ, other_typ) {
                out.insert(name, common);
            }
        }
    }
    out
}

/// Structure shared by both declarations, or None when the kinds disagree.
fn intersect_type(
    a: &IntrospectionType,
    b: &IntrospectionType,
) -> Option<IntrospectionType> {
    if a.kind != b.kind {
        return None;
    }

    let fields: Vec<IntrospectionField> = a
        .fields
        .iter()
        .filter(|f| {
            b.fields
                .iter()
                .any(|g| g.name == f.name && g.ty == f.ty && same_args(&g.args, &f.args))
        })
        .cloned()
        .collect();

    let input_fields: Vec<IntrospectionInputField> = a
        .input_fields
        .iter()
        .filter(|f| b.input_fields.iter().any(|g| g.name == f.name && g.ty == f.ty))
        .cloned()
        .collect();

    let possible_types: Vec<IntrospectionTypeRef> = a
        .possible_types
        .iter()
        .filter(|m| {
            b.possible_types
                .iter()
                .any(|n| n.root().name == m.root().name)
        })
        .cloned()
        .collect();

    let enum_values = a
        .enum_values
        .iter()
        .filter(|v| b.enum_values.iter().any(|w| w.name == v.name))
        .cloned()
        .collect();

    Some(IntrospectionType {
        kind: a.kind.clone(),
        name: a.name.clone(),
        fields,
        input_fields,
        possible_types,
        enum_values,
    })
}

/// Argument lists are order-insensitive; compare them as name -> type maps.
fn same_args(a: &[IntrospectionInputField], b: &[IntrospectionInputField]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let index: BTreeMap<&str, &IntrospectionTypeRef> =
        b.iter().map(|arg| (arg.name.as_str(), &arg.ty)).collect();
    a.iter()
        .all(|arg| index.get(arg.name.as_str()) == Some(&&arg.ty))
}

fn canonicalize(typ: &mut IntrospectionType) {
    typ.fields.sort_by(|a, b| a.name.cmp(&b.name));
    for field in &mut typ.fields {
        field.args.sort_by(|a, b| a.name.cmp(&b.name));
    }
    typ.input_fields.sort_by(|a, b| a.name.cmp(&b.name));
    typ.possible_types
        .sort_by(|a, b| a.root().name.cmp(&b.root().name));
    typ.enum_values.sort_by(|a, b| a.name.cmp(&b.name));
}

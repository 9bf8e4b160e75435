//! Query planning
//!
//! The planner walks a client selection tree against the annotated schema
//! and produces a tree of [`Plan`]s, each assigned to exactly one service.
//! Contiguous sub-selections resolvable by the same service stay in one
//! plan; selections that escape to another service become child plans keyed
//! on a path into the parent's response, with the federation keys the child
//! needs injected into the parent's selections at that path.
//!
//! Plans are computed per request and immutable once produced.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::PlanError;
use crate::schema::{FederatedSchema, Field, MergedType, TypeRef, FEDERATION_TYPE};
use crate::selection::{OperationKind, Selection};

/// One step of a [`Plan`] path. `Field` descends by response alias; `Each`
/// (rendered `?`) descends into every element of a list. The planner itself
/// emits alias segments only -- the executor's walker fans out over arrays it
/// encounters -- but explicit `Each` segments are part of the path language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    Each,
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathSegment::Field(name) => write!(f, "{}", name),
            PathSegment::Each => write!(f, "?"),
        }
    }
}

/// Render a path for error messages and logs.
pub fn path_to_string(path: &[PathSegment]) -> String {
    path.iter()
        .map(|seg| seg.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

/// A node in the execution tree: one service, one rooted selection, a path
/// from the enclosing plan, and the child plans that depend on its output.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// The single service that executes this node.
    pub service: String,
    /// Type name the node is rooted at: `Query`/`Mutation` for top-level
    /// plans, the shared object type name for hand-off children.
    pub type_name: String,
    /// Location of the hand-off point inside the parent's response. Empty
    /// for top-level plans.
    pub path: Vec<PathSegment>,
    /// Selection tree this service receives, including any federation-key
    /// fields injected for the children in `after`.
    pub selections: Vec<Selection>,
    /// Child plans whose inputs depend on this plan's output.
    pub after: Vec<Plan>,
}

/// The root of a planned request: a wrapper carrying no selections of its
/// own, whose `after` holds exactly the top-level per-service plans.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub after: Vec<Plan>,
}

struct Planned {
    selections: Vec<Selection>,
    after: Vec<Plan>,
}

/// Converts parsed selections plus the annotated schema into plan trees.
#[derive(Clone)]
pub struct Planner {
    schema: Arc<FederatedSchema>,
}

impl Planner {
    pub fn new(schema: Arc<FederatedSchema>) -> Self {
        Self { schema }
    }

    /// Plan a client selection set rooted at `Query` or `Mutation`.
    pub fn plan(
        &self,
        kind: OperationKind,
        selections: &[Selection],
    ) -> Result<QueryPlan, PlanError> {
        let root_type = match kind {
            OperationKind::Query => "Query",
            OperationKind::Mutation => "Mutation",
            OperationKind::Federation => {
                return Err(PlanError::UnknownObject(FEDERATION_TYPE.to_string()))
            }
        };
        let root = self
            .schema
            .object(root_type)
            .ok_or_else(|| PlanError::UnknownObject(root_type.to_string()))?;

        // Top-level selections group by their routed service; each group
        // becomes one top-level plan dispatched directly at the root type.
        let mut groups: BTreeMap<String, Vec<Selection>> = BTreeMap::new();
        for sel in selections {
            let field = root.fields.get(&sel.name).ok_or_else(|| {
                PlanError::UnknownField {
                    type_name: root_type.to_string(),
                    field: sel.name.clone(),
                }
            })?;
            let service = route(&sel.name, field)?;
            groups.entry(service).or_default().push(sel.clone());
        }

        let mut after = Vec::with_capacity(groups.len());
        for (service, group) in groups {
            let planned = self.plan_object(root_type, &service, &group)?;
            after.push(Plan {
                service,
                type_name: root_type.to_string(),
                path: Vec::new(),
                selections: planned.selections,
                after: planned.after,
            });
        }

        Ok(QueryPlan { after })
    }

    /// Plan a selection set at object type `type_name`, routed to `service`.
    ///
    /// Local selections recurse in place; selections the service cannot
    /// resolve collect per target service into child plans, and the keys
    /// those children need are injected into the local selection set.
    fn plan_object(
        &self,
        type_name: &str,
        service: &str,
        selections: &[Selection],
    ) -> Result<Planned, PlanError> {
        let obj = self
            .schema
            .object(type_name)
            .ok_or_else(|| PlanError::UnknownObject(type_name.to_string()))?;

        let mut local = Vec::new();
        let mut after = Vec::new();
        let mut cross: BTreeMap<String, Vec<Selection>> = BTreeMap::new();

        for sel in selections {
            let field = obj.fields.get(&sel.name).ok_or_else(|| {
                PlanError::UnknownField {
                    type_name: type_name.to_string(),
                    field: sel.name.clone(),
                }
            })?;
            self.validate_arguments(sel, field)?;

            if !field.services.contains(service) {
                let target = route(&sel.name, field)?;
                cross.entry(target).or_default().push(sel.clone());
                continue;
            }

            let field_root = field.ty.root_name();
            let is_object = self.schema.object(field_root).is_some();

            if sel.selections.is_empty() {
                if is_object {
                    return Err(PlanError::MissingSubselection(sel.name.clone()));
                }
                local.push(sel.clone());
            } else {
                if !is_object {
                    return Err(PlanError::SubselectionOnLeaf(sel.name.clone()));
                }
                let planned = self.plan_object(field_root, service, &sel.selections)?;
                for mut child in planned.after {
                    child.path.insert(0, PathSegment::Field(sel.alias.clone()));
                    after.push(child);
                }
                local.push(Selection {
                    name: sel.name.clone(),
                    alias: sel.alias.clone(),
                    args: sel.args.clone(),
                    selections: planned.selections,
                });
            }
        }

        for (target, group) in cross {
            let planned = self.plan_object(type_name, &target, &group)?;
            let entry = self.schema.entry(&target, type_name).ok_or_else(|| {
                PlanError::NoEntryPoint {
                    service: target.clone(),
                    type_name: type_name.to_string(),
                }
            })?;

            // The parent must emit every key the child's entry point needs
            // at this hand-off point.
            for key in &entry.keys {
                match local.iter().find(|s| s.alias == *key) {
                    Some(existing) if existing.name == *key => {}
                    Some(_) => return Err(PlanError::KeyAliasConflict(key.clone())),
                    None => {
                        let key_field = obj.fields.get(key).ok_or_else(|| {
                            PlanError::UnknownField {
                                type_name: type_name.to_string(),
                                field: key.clone(),
                            }
                        })?;
                        if !key_field.services.contains(service) {
                            return Err(PlanError::Unresolvable(key.clone()));
                        }
                        local.push(Selection::field(key.clone()));
                    }
                }
            }

            after.push(Plan {
                service: target,
                type_name: type_name.to_string(),
                path: Vec::new(),
                selections: planned.selections,
                after: planned.after,
            });
        }

        Ok(Planned {
            selections: local,
            after,
        })
    }

    fn validate_arguments(&self, sel: &Selection, field: &Field) -> Result<(), PlanError> {
        for arg_name in sel.args.keys() {
            if !field.args.contains_key(arg_name) {
                return Err(PlanError::InvalidArgument {
                    field: sel.name.clone(),
                    argument: arg_name.clone(),
                    reason: "unknown argument".to_string(),
                });
            }
        }

        for (arg_name, ty) in &field.args {
            match sel.args.get(arg_name) {
                Some(value) => self.coerce(&sel.name, arg_name, ty, value)?,
                None => {
                    if matches!(ty, TypeRef::NonNull(_)) {
                        return Err(PlanError::InvalidArgument {
                            field: sel.name.clone(),
                            argument: arg_name.clone(),
                            reason: "missing required argument".to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn coerce(
        &self,
        field: &str,
        argument: &str,
        ty: &TypeRef,
        value: &Value,
    ) -> Result<(), PlanError> {
        let fail = |reason: &str| PlanError::InvalidArgument {
            field: field.to_string(),
            argument: argument.to_string(),
            reason: reason.to_string(),
        };

        match ty {
            TypeRef::NonNull(inner) => {
                if value.is_null() {
                    return Err(fail("must not be null"));
                }
                self.coerce(field, argument, inner, value)
            }
            TypeRef::List(inner) => match value {
                Value::Null => Ok(()),
                Value::Array(items) => {
                    for item in items {
                        self.coerce(field, argument, inner, item)?;
                    }
                    Ok(())
                }
                // single-item list coercion
                other => self.coerce(field, argument, inner, other),
            },
            TypeRef::Named(name) => {
                if value.is_null() {
                    return Ok(());
                }
                match self.schema.get(name) {
                    Some(MergedType::Scalar(_)) => {
                        if value.is_object() || value.is_array() {
                            Err(fail("expected a scalar value"))
                        } else {
                            Ok(())
                        }
                    }
                    Some(MergedType::Enum(e)) => match value.as_str() {
                        Some(s) if e.values.iter().any(|v| v == s) => Ok(()),
                        _ => Err(fail("not a member of the enum")),
                    },
                    Some(MergedType::InputObject(input)) => {
                        let Value::Object(map) = value else {
                            return Err(fail("expected an input object"));
                        };
                        for key in map.keys() {
                            if !input.input_fields.contains_key(key) {
                                return Err(fail("unknown input field"));
                            }
                        }
                        for (name, input_ty) in &input.input_fields {
                            match map.get(name) {
                                Some(v) => self.coerce(field, argument, input_ty, v)?,
                                None => {
                                    if matches!(input_ty, TypeRef::NonNull(_)) {
                                        return Err(fail("missing required input field"));
                                    }
                                }
                            }
                        }
                        Ok(())
                    }
                    Some(_) => Err(fail("not an input type")),
                    None => Err(fail("unknown type")),
                }
            }
        }
    }
}

/// Deterministic tie-break: the lexicographically smallest resolving service.
fn route(field_name: &str, field: &Field) -> Result<String, PlanError> {
    field
        .services
        .iter()
        .next()
        .cloned()
        .ok_or_else(|| PlanError::Unresolvable(field_name.to_string()))
}

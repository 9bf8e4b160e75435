//! The merged, annotated gateway schema
//!
//! [`FederatedSchema::from_versioned`] turns a `service -> version ->
//! introspection` table into the single schema the planner and executor run
//! against. Versions of one service are intersected, services are unioned,
//! and the result is normalized into a type table annotated with:
//!
//! - per field, the set of services that can resolve it, and
//! - per federated object, the entry points through which each service
//!   accepts a hand-off and the key fields those entry points require.
//!
//! Two structural conventions identify federated objects. An object carrying
//! a field named `_federation` is federated on the declaring service. A
//! synthetic root type named `Federation` carries entry-point fields named
//! `<service>_<Object>`, each taking one input-object argument whose members
//! are the federation keys for that object on that service.
//!
//! The schema is computed once per topology snapshot and shared immutably
//! for the gateway's lifetime.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::SchemaError;
use crate::introspection::{IntrospectionField, IntrospectionResult, IntrospectionTypeRef};
use crate::merge::{merge_introspection, MergePolicy};

/// Marker field identifying a federated object on the declaring service.
pub const FEDERATION_MARKER: &str = "_federation";

/// Name of the synthetic root type holding federation entry points.
pub const FEDERATION_TYPE: &str = "Federation";

/// A resolved type reference. Named types are kept by name and looked up in
/// the schema's type table, which lets mutually recursive object types exist
/// without reference cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    /// The named type underneath all List/NonNull wrappers.
    pub fn root_name(&self) -> &str {
        match self {
            TypeRef::Named(name) => name,
            TypeRef::List(inner) | TypeRef::NonNull(inner) => inner.root_name(),
        }
    }

    /// Whether any wrapper in the chain is a list.
    pub fn is_list(&self) -> bool {
        match self {
            TypeRef::Named(_) => false,
            TypeRef::List(_) => true,
            TypeRef::NonNull(inner) => inner.is_list(),
        }
    }

    fn from_introspection(
        r: &IntrospectionTypeRef,
        shells: &BTreeMap<String, String>,
    ) -> Result<TypeRef, SchemaError> {
        match r.kind.as_str() {
            "LIST" => {
                let inner = r.of_type.as_deref().ok_or(SchemaError::MalformedTypeRef)?;
                Ok(TypeRef::List(Box::new(Self::from_introspection(
                    inner, shells,
                )?)))
            }
            "NON_NULL" => {
                let inner = r.of_type.as_deref().ok_or(SchemaError::MalformedTypeRef)?;
                Ok(TypeRef::NonNull(Box::new(Self::from_introspection(
                    inner, shells,
                )?)))
            }
            "SCALAR" | "OBJECT" | "UNION" | "INPUT_OBJECT" | "ENUM" => {
                let name = r.name.as_deref().ok_or(SchemaError::MalformedTypeRef)?;
                if !shells.contains_key(name) {
                    return Err(SchemaError::UnknownType(name.to_string()));
                }
                Ok(TypeRef::Named(name.to_string()))
            }
            other => Err(SchemaError::UnknownTypeKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeRef::Named(name) => write!(f, "{}", name),
            TypeRef::List(inner) => write!(f, "[{}]", inner),
            TypeRef::NonNull(inner) => write!(f, "{}!", inner),
        }
    }
}

/// A merged object field with its federation annotations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Return type, potentially wrapped in List/NonNull.
    pub ty: TypeRef,
    /// Declared input arguments.
    pub args: BTreeMap<String, TypeRef>,
    /// Services that can resolve this field. Non-empty after annotation.
    pub services: BTreeSet<String>,
    /// Services for which this field is a federation key: requesting it on
    /// the parent object is required when handing the object over.
    pub federated_keys: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectType {
    pub name: String,
    pub fields: BTreeMap<String, Field>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputObjectType {
    pub name: String,
    pub input_fields: BTreeMap<String, TypeRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalarType {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnionType {
    pub name: String,
    /// Member object type names.
    pub types: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    pub name: String,
    pub values: Vec<String>,
}

/// A normalized type: a closed sum over the supported kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergedType {
    Object(ObjectType),
    InputObject(InputObjectType),
    Scalar(ScalarType),
    Union(UnionType),
    Enum(EnumType),
}

impl MergedType {
    pub fn name(&self) -> &str {
        match self {
            MergedType::Object(t) => &t.name,
            MergedType::InputObject(t) => &t.name,
            MergedType::Scalar(t) => &t.name,
            MergedType::Union(t) => &t.name,
            MergedType::Enum(t) => &t.name,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectType> {
        match self {
            MergedType::Object(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_input_object(&self) -> Option<&InputObjectType> {
        match self {
            MergedType::InputObject(t) => Some(t),
            _ => None,
        }
    }
}

/// One `<service>_<Object>` entry point: the RPC endpoint through which
/// `service` rehydrates `object` instances from their keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederationEntry {
    /// Service that accepts the hand-off.
    pub service: String,
    /// Object type being handed off.
    pub object: String,
    /// Field name on the `Federation` root, e.g. `schema2_foo`.
    pub field: String,
    /// Name of the entry's single input-object argument.
    pub argument: String,
    /// Federation key fields the entry requires.
    pub keys: BTreeSet<String>,
}

/// The gateway's merged and annotated schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedSchema {
    services: Vec<String>,
    types: BTreeMap<String, MergedType>,
    /// service -> object -> entry point
    entry_points: BTreeMap<String, BTreeMap<String, FederationEntry>>,
}

impl FederatedSchema {
    /// Build the annotated schema from a `service -> version -> introspection`
    /// table. Services and versions merge in lexicographic order, so the same
    /// table always produces a structurally equal schema.
    pub fn from_versioned(
        schemas: BTreeMap<String, BTreeMap<String, IntrospectionResult>>,
    ) -> Result<Self, SchemaError> {
        let mut per_service: BTreeMap<String, IntrospectionResult> = BTreeMap::new();
        for (service, versions) in &schemas {
            let docs: Vec<IntrospectionResult> = versions.values().cloned().collect();
            per_service.insert(
                service.clone(),
                merge_introspection(&docs, MergePolicy::Intersection)?,
            );
        }

        let union_docs: Vec<IntrospectionResult> = per_service.values().cloned().collect();
        let merged = merge_introspection(&union_docs, MergePolicy::Union)?;
        let mut types = normalize(&merged)?;

        validate_federated_objects(&per_service, &types)?;

        let mut entry_points: BTreeMap<String, BTreeMap<String, FederationEntry>> =
            BTreeMap::new();
        for (service, doc) in &per_service {
            for typ in &doc.schema.types {
                if typ.name != FEDERATION_TYPE || typ.kind != "OBJECT" {
                    continue;
                }
                for field in &typ.fields {
                    let entry = parse_entry_point(service, field, &per_service, &types)?;
                    entry_points
                        .entry(service.clone())
                        .or_default()
                        .insert(entry.object.clone(), entry);
                }
            }
        }

        for entries in entry_points.values() {
            for entry in entries.values() {
                if let Some(MergedType::Object(obj)) = types.get_mut(&entry.object) {
                    for key in &entry.keys {
                        if let Some(field) = obj.fields.get_mut(key) {
                            field.federated_keys.insert(entry.service.clone());
                        }
                    }
                }
            }
        }

        for (service, doc) in &per_service {
            for typ in &doc.schema.types {
                if typ.kind != "OBJECT" {
                    continue;
                }
                if let Some(MergedType::Object(obj)) = types.get_mut(&typ.name) {
                    for field in &typ.fields {
                        if let Some(merged_field) = obj.fields.get_mut(&field.name) {
                            merged_field.services.insert(service.clone());
                        }
                    }
                }
            }
        }

        validate_shadow_types(&per_service, &types, &entry_points)?;

        Ok(Self {
            services: per_service.into_keys().collect(),
            types,
            entry_points,
        })
    }

    /// Build from one unversioned introspection result per service.
    pub fn from_services(
        schemas: BTreeMap<String, IntrospectionResult>,
    ) -> Result<Self, SchemaError> {
        let versioned = schemas
            .into_iter()
            .map(|(service, doc)| (service, BTreeMap::from([(String::new(), doc)])))
            .collect();
        Self::from_versioned(versioned)
    }

    /// Configured service names, sorted.
    pub fn services(&self) -> &[String] {
        &self.services
    }

    pub fn get(&self, name: &str) -> Option<&MergedType> {
        self.types.get(name)
    }

    pub fn object(&self, name: &str) -> Option<&ObjectType> {
        self.types.get(name).and_then(MergedType::as_object)
    }

    /// The entry point through which `service` accepts `object` hand-offs.
    pub fn entry(&self, service: &str, object: &str) -> Option<&FederationEntry> {
        self.entry_points.get(service)?.get(object)
    }

    pub fn types(&self) -> impl Iterator<Item = (&String, &MergedType)> {
        self.types.iter()
    }
}

/// Build the type table from the merged document in two passes: shells first
/// so references (including cyclic ones) can be checked, then full types.
fn normalize(
    doc: &IntrospectionResult,
) -> Result<BTreeMap<String, MergedType>, SchemaError> {
    let mut shells: BTreeMap<String, String> = BTreeMap::new();
    for typ in &doc.schema.types {
        match typ.kind.as_str() {
            "OBJECT" | "INPUT_OBJECT" | "SCALAR" | "UNION" | "ENUM" => {}
            other => return Err(SchemaError::UnknownTypeKind(other.to_string())),
        }
        if shells.insert(typ.name.clone(), typ.kind.clone()).is_some() {
            return Err(SchemaError::DuplicateType(typ.name.clone()));
        }
    }

    let mut types = BTreeMap::new();
    for typ in &doc.schema.types {
        let merged = match typ.kind.as_str() {
            "OBJECT" => {
                let mut fields = BTreeMap::new();
                for field in &typ.fields {
                    let ty = TypeRef::from_introspection(&field.ty, &shells)?;
                    let mut args = BTreeMap::new();
                    for arg in &field.args {
                        check_input_kind(&arg.name, &arg.ty)?;
                        args.insert(
                            arg.name.clone(),
                            TypeRef::from_introspection(&arg.ty, &shells)?,
                        );
                    }
                    fields.insert(
                        field.name.clone(),
                        Field {
                            ty,
                            args,
                            services: BTreeSet::new(),
                            federated_keys: BTreeSet::new(),
                        },
                    );
                }
                MergedType::Object(ObjectType {
                    name: typ.name.clone(),
                    fields,
                })
            }
            "INPUT_OBJECT" => {
                let mut input_fields = BTreeMap::new();
                for input in &typ.input_fields {
                    check_input_kind(&input.name, &input.ty)?;
                    input_fields.insert(
                        input.name.clone(),
                        TypeRef::from_introspection(&input.ty, &shells)?,
                    );
                }
                MergedType::InputObject(InputObjectType {
                    name: typ.name.clone(),
                    input_fields,
                })
            }
            "SCALAR" => MergedType::Scalar(ScalarType {
                name: typ.name.clone(),
            }),
            "UNION" => {
                let mut members = BTreeSet::new();
                for member in &typ.possible_types {
                    let root = member.root();
                    let name = root.name.as_deref().ok_or(SchemaError::MalformedTypeRef)?;
                    if shells.get(name).map(String::as_str) != Some("OBJECT") {
                        return Err(SchemaError::UnionMember {
                            union: typ.name.clone(),
                            member: name.to_string(),
                        });
                    }
                    members.insert(name.to_string());
                }
                MergedType::Union(UnionType {
                    name: typ.name.clone(),
                    types: members,
                })
            }
            "ENUM" => MergedType::Enum(EnumType {
                name: typ.name.clone(),
                values: typ.enum_values.iter().map(|v| v.name.clone()).collect(),
            }),
            _ => unreachable!("kinds validated in pass one"),
        };
        types.insert(typ.name.clone(), merged);
    }

    Ok(types)
}

/// Arguments and input fields may only reference input kinds.
fn check_input_kind(name: &str, ty: &IntrospectionTypeRef) -> Result<(), SchemaError> {
    let root = ty.root();
    match root.kind.as_str() {
        "SCALAR" | "ENUM" | "INPUT_OBJECT" => Ok(()),
        other => Err(SchemaError::BadInputKind {
            field: name.to_string(),
            kind: other.to_string(),
        }),
    }
}

/// An object federated on any service must carry the `_federation` marker on
/// every service that declares it; a partially federated object would leave
/// the gateway with instances it cannot hand off.
fn validate_federated_objects(
    per_service: &BTreeMap<String, IntrospectionResult>,
    types: &BTreeMap<String, MergedType>,
) -> Result<(), SchemaError> {
    for name in types.keys() {
        if name == "Query" || name == "Mutation" {
            continue;
        }

        let federated_somewhere = per_service
            .values()
            .any(|doc| declares_marker(doc, name));
        if !federated_somewhere {
            continue;
        }

        for doc in per_service.values() {
            let declares = doc
                .schema
                .types
                .iter()
                .any(|typ| typ.kind == "OBJECT" && typ.name == *name);
            if declares && !declares_marker(doc, name) {
                return Err(SchemaError::NotFederatedEverywhere(name.clone()));
            }
        }
    }
    Ok(())
}

fn declares_marker(doc: &IntrospectionResult, type_name: &str) -> bool {
    doc.schema.types.iter().any(|typ| {
        typ.kind == "OBJECT"
            && typ.name == type_name
            && typ.fields.iter().any(|f| f.name == FEDERATION_MARKER)
    })
}

/// Resolve one field of the `Federation` root into a [`FederationEntry`],
/// validating the naming convention, the single input-object argument, and
/// every federation key it names.
fn parse_entry_point(
    service: &str,
    field: &IntrospectionField,
    per_service: &BTreeMap<String, IntrospectionResult>,
    types: &BTreeMap<String, MergedType>,
) -> Result<FederationEntry, SchemaError> {
    let Some((_, object)) = field.name.split_once('_') else {
        return Err(SchemaError::MalformedEntryPoint(field.name.clone()));
    };
    if object.is_empty() {
        return Err(SchemaError::MalformedEntryPoint(field.name.clone()));
    }

    let Some(MergedType::Object(obj)) = types.get(object) else {
        return Err(SchemaError::UnknownType(object.to_string()));
    };

    if field.args.len() != 1 {
        return Err(SchemaError::EntryPointArgument(field.name.clone()));
    }
    let arg = &field.args[0];
    let root = arg.ty.root();
    let input_name = root.name.as_deref().ok_or(SchemaError::MalformedTypeRef)?;
    let Some(MergedType::InputObject(input)) = types.get(input_name) else {
        return Err(SchemaError::NotInputObject {
            entry: field.name.clone(),
            argument: arg.name.clone(),
        });
    };

    let keys: BTreeSet<String> = input.input_fields.keys().cloned().collect();
    for key in &keys {
        // Every service that can be the source of a hand-off (it declares the
        // object as a federated root) must expose the key, or the gateway
        // would have no way to obtain it before hopping.
        for (source, doc) in per_service {
            if source == service {
                continue;
            }
            for typ in &doc.schema.types {
                if typ.kind != "OBJECT" || typ.name != object {
                    continue;
                }
                let is_root = typ.fields.iter().any(|f| f.name == FEDERATION_MARKER);
                if is_root && !typ.fields.iter().any(|f| f.name == *key) {
                    return Err(SchemaError::InvalidFederationKey {
                        object: object.to_string(),
                        key: key.clone(),
                    });
                }
            }
        }

        if !obj.fields.contains_key(key) {
            return Err(SchemaError::KeyNotOnObject {
                object: object.to_string(),
                key: key.clone(),
            });
        }
    }

    Ok(FederationEntry {
        service: service.to_string(),
        object: object.to_string(),
        field: field.name.clone(),
        argument: arg.name.clone(),
        keys,
    })
}

/// A service may only return a federated object it does not itself declare
/// when it registered an entry point for it; otherwise it would leak
/// instances no service advertises it can hand off.
fn validate_shadow_types(
    per_service: &BTreeMap<String, IntrospectionResult>,
    types: &BTreeMap<String, MergedType>,
    entry_points: &BTreeMap<String, BTreeMap<String, FederationEntry>>,
) -> Result<(), SchemaError> {
    for (service, doc) in per_service {
        for typ in &doc.schema.types {
            if typ.kind != "OBJECT" {
                continue;
            }
            for field in &typ.fields {
                let root = field.ty.root();
                if root.kind != "OBJECT" {
                    continue;
                }
                let Some(return_name) = root.name.as_deref() else {
                    continue;
                };
                let Some(MergedType::Object(obj)) = types.get(return_name) else {
                    continue;
                };
                let Some(marker) = obj.fields.get(FEDERATION_MARKER) else {
                    continue;
                };
                if marker.services.contains(service) {
                    continue;
                }
                let has_entry = entry_points
                    .get(service)
                    .map(|entries| entries.contains_key(return_name))
                    .unwrap_or(false);
                if !has_entry {
                    return Err(SchemaError::ShadowType {
                        field: format!("{}.{}", typ.name, field.name),
                        object: return_name.to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

//! Passive data model for GraphQL introspection results
//!
//! Downstream services describe their schemas through the standard
//! introspection query. Nothing in here interprets the schema; the types
//! mirror the wire shape so documents can be merged structurally before the
//! normalizer builds the gateway's type table.

use serde::{Deserialize, Deserializer, Serialize};

/// The introspection query sent to every configured service at startup.
///
/// Only the portions of `__schema` that the merger consumes are requested.
pub const INTROSPECTION_QUERY: &str = "\
query IntrospectionQuery {
  __schema {
    types {
      kind
      name
      fields {
        name
        type { ...TypeRef }
        args { name type { ...TypeRef } }
      }
      inputFields { name type { ...TypeRef } }
      possibleTypes { ...TypeRef }
      enumValues { name }
    }
  }
}
fragment TypeRef on __Type {
  kind
  name
  ofType {
    kind
    name
    ofType {
      kind
      name
      ofType { kind name ofType { kind name } }
    }
  }
}";

/// One service's schema as reported by the introspection query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntrospectionResult {
    #[serde(rename = "__schema")]
    pub schema: IntrospectionSchema,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntrospectionSchema {
    #[serde(default, deserialize_with = "null_as_default")]
    pub types: Vec<IntrospectionType>,
}

/// A declared type: OBJECT, INPUT_OBJECT, SCALAR, UNION, or ENUM.
///
/// `kind` stays a string here; rejecting unknown kinds is the normalizer's
/// job and must surface as a schema-configuration error, not a decode error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntrospectionType {
    pub kind: String,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fields: Vec<IntrospectionField>,
    #[serde(
        rename = "inputFields",
        default,
        deserialize_with = "null_as_default"
    )]
    pub input_fields: Vec<IntrospectionInputField>,
    #[serde(
        rename = "possibleTypes",
        default,
        deserialize_with = "null_as_default"
    )]
    pub possible_types: Vec<IntrospectionTypeRef>,
    #[serde(
        rename = "enumValues",
        default,
        deserialize_with = "null_as_default"
    )]
    pub enum_values: Vec<IntrospectionEnumValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntrospectionField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: IntrospectionTypeRef,
    #[serde(default, deserialize_with = "null_as_default")]
    pub args: Vec<IntrospectionInputField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntrospectionInputField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: IntrospectionTypeRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntrospectionEnumValue {
    pub name: String,
}

/// A nested `(kind, name, ofType)` reference. LIST and NON_NULL wrap another
/// reference; all other kinds terminate the chain with a type name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntrospectionTypeRef {
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "ofType", default)]
    pub of_type: Option<Box<IntrospectionTypeRef>>,
}

impl IntrospectionTypeRef {
    /// Strip LIST/NON_NULL wrappers down to the named reference.
    pub fn root(&self) -> &IntrospectionTypeRef {
        match &self.of_type {
            Some(inner) => inner.root(),
            None => self,
        }
    }

    /// Whether any wrapper in the chain is a LIST.
    pub fn is_list(&self) -> bool {
        self.kind == "LIST"
            || self
                .of_type
                .as_ref()
                .map(|inner| inner.is_list())
                .unwrap_or(false)
    }
}

impl std::fmt::Display for IntrospectionTypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind.as_str() {
            "LIST" => match &self.of_type {
                Some(inner) => write!(f, "[{}]", inner),
                None => write!(f, "[?]"),
            },
            "NON_NULL" => match &self.of_type {
                Some(inner) => write!(f, "{}!", inner),
                None => write!(f, "?!"),
            },
            _ => write!(f, "{}", self.name.as_deref().unwrap_or("?")),
        }
    }
}

/// Introspection responses encode absent collections as `null`; treat them
/// as empty so the merger never has to distinguish the two.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

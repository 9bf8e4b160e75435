//! Error types for the federation gateway

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the gateway
///
/// This enum covers all possible errors that can occur within the gateway.
/// Schema, planning, and execution errors carry their own enums because they
/// surface at different points of a request's life: schema errors abort
/// startup, planning errors abort a request before any RPC, and execution
/// errors abort a request and cancel outstanding sub-RPCs.
#[derive(Error, Debug)]
pub enum Error {
    /// Schema-configuration errors detected while merging service schemas
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Per-request planning errors
    #[error("planning error: {0}")]
    Plan(#[from] PlanError),

    /// Per-request execution errors
    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Invalid client request (parse failures, unsupported operations)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Gateway configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Downstream HTTP transport errors
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error
    #[error("error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Errors raised while merging and validating service schemas.
///
/// All of these abort gateway startup; a topology that fails any of the
/// federation validations would produce objects the gateway cannot route.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("duplicate type {0}")]
    DuplicateType(String),

    #[error("unknown type kind {0}")]
    UnknownTypeKind(String),

    #[error("type {0} not found among declared types")]
    UnknownType(String),

    #[error("malformed type reference")]
    MalformedTypeRef,

    #[error("type {0} is declared with conflicting kinds across services")]
    KindConflict(String),

    #[error("conflicting declarations of {type_name}.{field} across services")]
    TypeConflict { type_name: String, field: String },

    #[error("input field {field} has non-input kind {kind}")]
    BadInputKind { field: String, kind: String },

    #[error("union {union} member {member} is not an object")]
    UnionMember { union: String, member: String },

    #[error("object {0} is declared by another service and is not federated")]
    NotFederatedEverywhere(String),

    #[error("federation entry point {0} is not named <service>_<Object>")]
    MalformedEntryPoint(String),

    #[error("federation entry point {0} must take exactly one input-object argument")]
    EntryPointArgument(String),

    #[error("argument {argument} of federation entry point {entry} is not an input object")]
    NotInputObject { entry: String, argument: String },

    #[error("invalid federation key {key} for object {object}")]
    InvalidFederationKey { object: String, key: String },

    #[error("input field {key} is not a field on object {object}")]
    KeyNotOnObject { object: String, key: String },

    #[error("field {field} returns shadow type {object} with no federation entry point")]
    ShadowType { field: String, object: String },
}

/// Errors raised while planning a client selection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("object type {0} does not exist in the merged schema")]
    UnknownObject(String),

    #[error("field {field} does not exist on type {type_name}")]
    UnknownField { type_name: String, field: String },

    #[error("field {0} is resolvable by no configured service")]
    Unresolvable(String),

    #[error("no federation entry point hands {type_name} off to service {service}")]
    NoEntryPoint { service: String, type_name: String },

    #[error("alias {0} shadows a federation key selection")]
    KeyAliasConflict(String),

    #[error("field {0} of object type must carry a sub-selection")]
    MissingSubselection(String),

    #[error("field {0} of leaf type cannot carry a sub-selection")]
    SubselectionOnLeaf(String),

    #[error("invalid argument {argument} for field {field}: {reason}")]
    InvalidArgument {
        field: String,
        argument: String,
        reason: String,
    },
}

/// Errors raised while executing a plan tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("no client configured for service {0}")]
    UnknownService(String),

    #[error("no federation entry point for {type_name} on service {service}")]
    MissingEntryPoint { service: String, type_name: String },

    #[error("service {service} returned an error: {message}")]
    Downstream { service: String, message: String },

    #[error("response shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("missing federation key {key} at a {type_name} hand-off site")]
    MissingKey { key: String, type_name: String },

    #[error("entry point {entry} returned {actual} rows for {expected} keys")]
    BatchLength {
        entry: String,
        expected: usize,
        actual: usize,
    },

    #[error("federation key {0} disagrees between parent and child responses")]
    KeyMismatch(String),

    #[error("request cancelled")]
    Cancelled,
}

impl Error {
    /// Convert error to GraphQL error format
    ///
    /// # Security
    ///
    /// In production (ENV=production), transport and internal error details
    /// are sanitized to prevent information disclosure. Schema, planning,
    /// and execution errors are safe to show to clients.
    pub fn to_graphql_error(&self) -> GraphQLError {
        let is_production = std::env::var("ENV")
            .map(|e| e == "production" || e == "prod")
            .unwrap_or(false);

        let message = if is_production {
            match self {
                Error::Transport(_) => "Service connection error".to_string(),
                Error::Io(_) => "Internal server error".to_string(),
                Error::Other(_) => "An unexpected error occurred".to_string(),
                Error::Config(_) => "Gateway misconfigured".to_string(),
                safe => safe.to_string(),
            }
        } else {
            self.to_string()
        };

        GraphQLError {
            message,
            extensions: self.extensions(),
        }
    }

    /// Get error code for extensions
    fn extensions(&self) -> std::collections::HashMap<String, serde_json::Value> {
        let mut map = std::collections::HashMap::new();
        let code = match self {
            Error::Schema(_) => "SCHEMA_ERROR",
            Error::Plan(_) => "PLAN_ERROR",
            Error::Execution(ExecutionError::Cancelled) => "REQUEST_CANCELLED",
            Error::Execution(_) => "EXECUTION_ERROR",
            Error::InvalidRequest(_) => "INVALID_REQUEST",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Transport(_) => "TRANSPORT_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Other(_) => "UNKNOWN_ERROR",
        };
        map.insert("code".to_string(), serde_json::json!(code));
        map
    }
}

/// GraphQL error response format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(skip_serializing_if = "std::collections::HashMap::is_empty", default)]
    pub extensions: std::collections::HashMap<String, serde_json::Value>,
}

impl From<Error> for GraphQLError {
    fn from(err: Error) -> Self {
        err.to_graphql_error()
    }
}

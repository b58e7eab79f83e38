//! Compilation and type map errors.
use std::fmt;

use apollo_compiler::validation::DiagnosticList;
use displaydoc::Display;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::graphql;
use crate::graphql::ErrorExtension;
use crate::graphql::IntoGraphQLErrors;
use crate::graphql::Location;
use crate::json_ext::Object;

/// Errors that abort the compilation of an operation.
///
/// Nothing is published to the compile cache when one of these is returned.
#[derive(Error, Debug, Display, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum CompileError {
    /// parsing error: {0}
    ParsingError(Diagnostics),
    /// validation error: {0}
    ValidationError(Diagnostics),
    /// Unknown operation named "{0}"
    UnknownOperation(String),
    /// Must provide operation name if query contains multiple operations.
    MultipleOperations,
    /// Must provide an operation.
    NoOperation,
    /// Unknown fragment "{0}".
    UnknownFragment(String),
    /// Cannot spread fragment "{0}" within itself.
    CyclicFragment(String),
    /// the schema does not define a {0} root type
    MissingRootType(String),
    /// unknown type '{0}'
    UnknownType(String),
    /// cannot query field '{field}' on type '{type_name}'
    UnknownField { type_name: String, field: String },
    /// cannot embed constant value: {0}
    UnembeddableConstant(String),
    /// selection processing recursion limit exceeded
    RecursionLimitExceeded,
    /// the compiled plan exceeds the limit of {0} field plans
    PlanTooLarge(usize),
    /// internal error while {stage}: {reason}
    Internal { stage: String, reason: String },
}

impl ErrorExtension for CompileError {
    fn extension_code(&self) -> String {
        match self {
            CompileError::ParsingError(_) => "GRAPHQL_PARSING_FAILED",
            CompileError::ValidationError(_)
            | CompileError::UnknownFragment(_)
            | CompileError::CyclicFragment(_)
            | CompileError::UnknownType(_)
            | CompileError::UnknownField { .. } => "GRAPHQL_VALIDATION_FAILED",
            CompileError::UnknownOperation(_)
            | CompileError::MultipleOperations
            | CompileError::NoOperation => "GRAPHQL_UNKNOWN_OPERATION_NAME",
            CompileError::MissingRootType(_) => "OPERATION_NOT_SUPPORTED",
            CompileError::UnembeddableConstant(_) => "UNEMBEDDABLE_CONSTANT",
            CompileError::RecursionLimitExceeded => "RECURSION_LIMIT_EXCEEDED",
            CompileError::PlanTooLarge(_) => "PLAN_TOO_LARGE",
            CompileError::Internal { .. } => "INTERNAL_SERVER_ERROR",
        }
        .to_string()
    }

    fn custom_extension_details(&self) -> Option<Object> {
        let mut obj = Object::new();
        match self {
            CompileError::UnknownType(ty) => {
                obj.insert("type", ty.clone().into());
            }
            CompileError::UnknownField { type_name, field } => {
                obj.insert("type", type_name.clone().into());
                obj.insert("field", field.clone().into());
            }
            CompileError::UnknownFragment(name) | CompileError::CyclicFragment(name) => {
                obj.insert("fragment", name.clone().into());
            }
            _ => (),
        }

        (!obj.is_empty()).then_some(obj)
    }
}

impl IntoGraphQLErrors for CompileError {
    fn into_graphql_errors(self) -> Vec<graphql::Error> {
        let code = self.extension_code();
        match self {
            CompileError::ParsingError(diagnostics)
            | CompileError::ValidationError(diagnostics) => diagnostics
                .errors
                .into_iter()
                .map(|error| {
                    graphql::Error::builder()
                        .message(error.message)
                        .locations(error.locations)
                        .extension_code(code.clone())
                        .build()
                })
                .collect(),
            other => vec![
                graphql::Error::builder()
                    .message(other.to_string())
                    .extension_code(code)
                    .extensions(other.custom_extension_details().unwrap_or_default())
                    .build(),
            ],
        }
    }
}

/// Errors that stop an invocation before any field is resolved.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub(crate) enum ExecutionError {
    /// Variable "${name}" of required type "{ty}" was not provided.
    MissingVariable { name: String, ty: String },
    /// Variable "${name}" of non-null type "{ty}" must not be null.
    NullVariable { name: String, ty: String },
    /// invalid type for variable: '{name}'
    ValidationInvalidTypeVariable { name: String },
    /// operation uses @defer or @stream and no generic executor is configured ({reason})
    IncrementalDeliveryUnsupported { reason: String },
}

impl ErrorExtension for ExecutionError {
    fn extension_code(&self) -> String {
        match self {
            ExecutionError::MissingVariable { .. }
            | ExecutionError::NullVariable { .. }
            | ExecutionError::ValidationInvalidTypeVariable { .. } => {
                "VALIDATION_INVALID_TYPE_VARIABLE"
            }
            ExecutionError::IncrementalDeliveryUnsupported { .. } => {
                "INCREMENTAL_DELIVERY_UNSUPPORTED"
            }
        }
        .to_string()
    }

    fn custom_extension_details(&self) -> Option<Object> {
        let mut obj = Object::new();
        match self {
            ExecutionError::MissingVariable { name, .. }
            | ExecutionError::NullVariable { name, .. }
            | ExecutionError::ValidationInvalidTypeVariable { name } => {
                obj.insert("name", name.clone().into());
            }
            ExecutionError::IncrementalDeliveryUnsupported { .. } => {}
        }

        (!obj.is_empty()).then_some(obj)
    }
}

impl ExecutionError {
    pub(crate) fn to_graphql_error(&self) -> graphql::Error {
        graphql::Error::builder()
            .message(self.to_string())
            .extension_code(self.extension_code())
            .extensions(self.custom_extension_details().unwrap_or_default())
            .build()
    }
}

/// A located diagnostic reported by the parser or the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The message of the diagnostic.
    pub message: String,
    /// Where in the document the problem was found.
    pub locations: Vec<Location>,
}

/// Collection of parsing or validation diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Diagnostics {
    pub errors: Vec<Diagnostic>,
}

impl From<&DiagnosticList> for Diagnostics {
    fn from(list: &DiagnosticList) -> Self {
        Self {
            errors: list
                .iter()
                .map(|diagnostic| {
                    let error = diagnostic.to_json();
                    Diagnostic {
                        message: error.message,
                        locations: error.locations.into_iter().map(Location::from).collect(),
                    }
                })
                .collect(),
        }
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut errors = self.errors.iter();
        for (i, error) in errors.by_ref().take(5).enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}", error.message)?;
        }
        let remaining = errors.count();
        if remaining > 0 {
            write!(f, "\n...and {remaining} other errors")?;
        }
        Ok(())
    }
}

/// Errors raised while building a [`TypeMap`](crate::TypeMap) from a schema and its resolvers.
#[derive(Error, Debug, Display, Clone, PartialEq)]
#[non_exhaustive]
pub enum BuildError {
    /// invalid schema: {0}
    InvalidSchema(Diagnostics),
    /// type '{0}' is not defined in the schema
    UnknownType(String),
    /// field '{type_name}.{field}' is not defined in the schema
    UnknownField { type_name: String, field: String },
    /// type '{0}' is not an interface or a union and cannot have a type resolver
    NotAbstract(String),
    /// type '{0}' is not a scalar and cannot have a serializer
    NotScalar(String),
    /// type '{0}' is a built-in scalar and its serialization cannot be replaced
    BuiltinScalar(String),
    /// default value of '{coordinate}' cannot be embedded: {reason}
    InvalidDefault { coordinate: String, reason: String },
}

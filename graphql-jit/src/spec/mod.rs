//! The schema side of compilation: resolver bindings, the type map, and the
//! building blocks used to read operations against it.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

mod field_type;
mod fragments;
mod resolvers;
mod selection;
mod type_map;

pub(crate) use field_type::*;
pub(crate) use fragments::*;
pub use resolvers::FieldError;
pub use resolvers::ResolveInfo;
pub(crate) use resolvers::ResolverBinding;
pub use resolvers::ResolverResult;
pub use resolvers::Resolvers;
pub(crate) use resolvers::SerializerFn;
pub(crate) use resolvers::TypeResolverFn;
pub(crate) use selection::*;
pub(crate) use type_map::InputValueSpec;
pub(crate) use type_map::TypeKind;
pub use type_map::TypeMap;

pub(crate) const TYPENAME: &str = "__typename";
pub(crate) const SCHEMA_FIELD: &str = "__schema";
pub(crate) const TYPE_FIELD: &str = "__type";

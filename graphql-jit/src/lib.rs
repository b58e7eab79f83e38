//! Compiles validated GraphQL operations into reusable execution plans.
//!
//! A [`Compiler`] turns an operation into a [`CompiledQuery`]: a tree of
//! resolver invocations specialized for one query shape, which can then be
//! invoked any number of times against a root value, variables and a
//! [`Context`]. Operations that need incremental delivery are routed to a
//! [`GenericExecutor`] instead.

#![cfg_attr(feature = "failfast", allow(unreachable_code))]
#![warn(unreachable_pub)]

macro_rules! failfast_debug {
    ($($tokens:tt)+) => {{
        tracing::debug!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

macro_rules! failfast_error {
    ($($tokens:tt)+) => {{
        tracing::error!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

#[macro_use]
pub mod json_ext;

mod cache;
pub mod compiler;
mod configuration;
mod context;
pub mod error;
mod execution;
mod executor;
pub mod graphql;
pub mod spec;

pub use cache::CacheStats;
pub use compiler::Compilation;
pub use compiler::CompiledQuery;
pub use compiler::Compiler;
pub use compiler::FallbackReason;
pub use configuration::Cache;
pub use configuration::Configuration;
pub use configuration::ConfigurationError;
pub use configuration::Jit;
pub use configuration::Limits;
pub use context::Context;
pub use context::ContextValue;
pub use error::BuildError;
pub use error::CompileError;
pub use execution::ResponsePath;
pub use executor::Executor;
pub use executor::GenericExecutor;
pub use graphql::Request;
pub use graphql::Response;
pub use spec::FieldError;
pub use spec::ResolveInfo;
pub use spec::ResolverResult;
pub use spec::Resolvers;
pub use spec::TypeMap;

//! Request entry point: compiled plans, with a generic executor for the
//! operations the compiler does not handle.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::compiler::Compilation;
use crate::compiler::Compiler;
use crate::context::Context;
use crate::error::ExecutionError;
use crate::graphql::IntoGraphQLErrors;
use crate::graphql::Request;
use crate::graphql::Response;
use crate::json_ext::Value;

/// Executes operations without compiling them, for example an interpreter
/// supporting `@defer` and `@stream`.
#[async_trait]
pub trait GenericExecutor: Send + Sync + 'static {
    async fn execute(&self, request: &Request, root: &Value, context: &Context) -> Response;
}

/// Runs requests through a [`Compiler`], handing fallback operations to a
/// [`GenericExecutor`] when one is configured.
#[derive(Clone)]
pub struct Executor {
    compiler: Compiler,
    generic: Option<Arc<dyn GenericExecutor>>,
}

impl Executor {
    pub fn new(compiler: Compiler) -> Self {
        Self {
            compiler,
            generic: None,
        }
    }

    pub fn with_generic_executor(mut self, generic: impl GenericExecutor) -> Self {
        self.generic = Some(Arc::new(generic));
        self
    }

    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }

    /// Compiles the request's operation (or reuses a cached plan) and runs it.
    ///
    /// Compile errors and fallback operations without a generic executor
    /// produce a response without `data`.
    #[tracing::instrument(
        skip_all,
        level = "trace",
        fields(operation_name = ?request.operation_name)
    )]
    pub async fn execute(&self, request: &Request, root: &Value, context: &Context) -> Response {
        match self
            .compiler
            .compile(&request.query, request.operation_name.as_deref())
        {
            Ok(Compilation::Compiled(query)) => {
                query.execute(root, &request.variables, context).await
            }
            Ok(Compilation::Fallback(reason)) => match &self.generic {
                Some(generic) => generic.execute(request, root, context).await,
                None => Response::from_errors(vec![
                    ExecutionError::IncrementalDeliveryUnsupported {
                        reason: reason.to_string(),
                    }
                    .to_graphql_error(),
                ]),
            },
            Err(error) => {
                tracing::debug!(%error, "compilation failed");
                Response::from_errors(error.into_graphql_errors())
            }
        }
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("compiler", &self.compiler)
            .field("generic", &self.generic.is_some())
            .finish()
    }
}

//! Turns operations into [`CompiledQuery`] plans.
//!
//! Compilation reads the operation against the [`TypeMap`] exactly once:
//! fragments are checked, fields are collected and merged per concrete type,
//! arguments are bound, introspection is evaluated where it does not depend on
//! variables and every selection set gets a static schedule. Invoking the plan
//! only runs resolvers and completes their values.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::executable::Operation;
use apollo_compiler::executable::OperationType;
use apollo_compiler::executable::Selection;
use apollo_compiler::executable::SelectionSet;
use apollo_compiler::validation::Valid;
use apollo_compiler::validation::WithErrors;
use displaydoc::Display;

use crate::cache::CacheStats;
use crate::cache::DedupCache;
use crate::configuration::Configuration;
use crate::context::Context;
use crate::error::CompileError;
use crate::error::Diagnostics;
use crate::error::ExecutionError;
use crate::execution;
use crate::execution::ExecutionContext;
use crate::graphql::Response;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::spec::Fragments;
use crate::spec::TypeMap;

pub(crate) mod collect;
pub(crate) mod generate;
pub(crate) mod identifier;
pub(crate) mod introspection;
pub(crate) mod plan;
pub(crate) mod schedule;
pub(crate) mod value;
pub(crate) mod variables;

pub use value::serialize_constant;

use self::generate::Generator;
use self::plan::SelectionPlan;
use self::variables::Variables;

const DEFER: &str = "defer";
const STREAM: &str = "stream";

type CacheKey = (String, Option<String>);

/// Why an operation is left to a generic executor.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum FallbackReason {
    /// the operation uses @defer
    Defer,
    /// the operation uses @stream
    Stream,
}

/// Outcome of a successful compilation.
#[derive(Debug, Clone)]
pub enum Compilation {
    /// A plan ready to be invoked.
    Compiled(Arc<CompiledQuery>),
    /// The operation needs incremental delivery and must be run by a generic
    /// executor instead. This is not an error.
    Fallback(FallbackReason),
}

impl Compilation {
    /// The compiled plan, unless the operation was routed to fallback.
    pub fn compiled(&self) -> Option<&Arc<CompiledQuery>> {
        match self {
            Compilation::Compiled(query) => Some(query),
            Compilation::Fallback(_) => None,
        }
    }
}

#[derive(Debug, Display, Clone, Copy)]
enum Stage {
    /// parsing
    Parsing,
    /// detecting incremental delivery
    Detecting,
    /// validating
    Validating,
    /// extracting the operation
    Extracting,
    /// checking fragments
    Fragments,
    /// generating
    Generating,
}

/// Compiles operations against one [`TypeMap`] and caches the results.
///
/// The cache belongs to the compiler: building a new type map means building a
/// new compiler, which starts with an empty cache.
#[derive(Clone)]
pub struct Compiler {
    type_map: Arc<TypeMap>,
    configuration: Arc<Configuration>,
    cache: DedupCache<CacheKey, Compilation, CompileError>,
}

impl Compiler {
    pub fn new(type_map: Arc<TypeMap>, configuration: Configuration) -> Self {
        Self {
            cache: DedupCache::new(configuration.cache.capacity, configuration.cache.ttl),
            type_map,
            configuration: Arc::new(configuration),
        }
    }

    pub fn type_map(&self) -> &Arc<TypeMap> {
        &self.type_map
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Compiles the operation named `operation_name` in `query`, or its only
    /// operation.
    ///
    /// Results are cached by normalized query text and operation name:
    /// concurrent first compilations of the same key run once, and errors are
    /// shared with the callers waiting for them but never stored.
    #[tracing::instrument(skip_all, level = "trace", fields(operation_name = ?operation_name))]
    pub fn compile(
        &self,
        query: &str,
        operation_name: Option<&str>,
    ) -> Result<Compilation, CompileError> {
        let key = (normalize_query(query), operation_name.map(str::to_string));
        loop {
            let entry = self.cache.get(key.clone());
            if entry.is_first() {
                tracing::debug!("compile cache miss");
                let result = self.compile_query(query, operation_name);
                match &result {
                    Ok(compilation) => entry.insert(compilation.clone()),
                    Err(error) => entry.error(error.clone()),
                }
                return result;
            }
            // `None` when the compiling caller went away: try again
            if let Some(result) = entry.get() {
                tracing::debug!("compile cache hit");
                return result;
            }
        }
    }

    /// Compiles an operation of a document validated by the caller. The
    /// result is not cached.
    #[tracing::instrument(skip_all, level = "trace", fields(operation_name = ?operation_name))]
    pub fn compile_document(
        &self,
        document: &Valid<ExecutableDocument>,
        operation_name: Option<&str>,
    ) -> Result<Compilation, CompileError> {
        tracing::trace!(stage = %Stage::Extracting);
        let operation = select_operation(document, operation_name)?;
        if let Some(reason) = self.detect_fallback(document, operation) {
            return Ok(Compilation::Fallback(reason));
        }
        self.compile_valid(document, operation_name)
            .map(Compilation::Compiled)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear()
    }

    fn compile_query(
        &self,
        query: &str,
        operation_name: Option<&str>,
    ) -> Result<Compilation, CompileError> {
        let schema = self.type_map.schema();

        tracing::trace!(stage = %Stage::Parsing);
        let document =
            ExecutableDocument::parse(schema, query, "query.graphql").map_err(
                |WithErrors { errors, .. }| CompileError::ParsingError(Diagnostics::from(&errors)),
            )?;

        // @defer and @stream are not necessarily defined by the schema, look
        // for them in the selected operation before validation rejects them
        tracing::trace!(stage = %Stage::Extracting);
        let operation = select_operation(&document, operation_name)?;
        if let Some(reason) = self.detect_fallback(&document, operation) {
            return Ok(Compilation::Fallback(reason));
        }

        tracing::trace!(stage = %Stage::Validating);
        let document = document.validate(schema).map_err(|invalid| {
            CompileError::ValidationError(Diagnostics::from(&invalid.errors))
        })?;

        self.compile_valid(&document, operation_name)
            .map(Compilation::Compiled)
    }

    fn detect_fallback(
        &self,
        document: &ExecutableDocument,
        operation: &Operation,
    ) -> Option<FallbackReason> {
        tracing::trace!(stage = %Stage::Detecting);
        let reason = incremental_delivery(document, &operation.selection_set);
        if let Some(reason) = reason {
            tracing::warn!(
                operation_name = ?operation.name,
                "{reason}: the operation is routed to the generic executor"
            );
        }
        reason
    }

    fn compile_valid(
        &self,
        document: &ExecutableDocument,
        operation_name: Option<&str>,
    ) -> Result<Arc<CompiledQuery>, CompileError> {
        tracing::trace!(stage = %Stage::Extracting);
        let operation = select_operation(document, operation_name)?;

        tracing::trace!(stage = %Stage::Fragments);
        let fragments = Fragments::new(document, &operation.selection_set)?;
        let root_type = self
            .type_map
            .schema()
            .root_operation(operation.operation_type)
            .ok_or_else(|| {
                CompileError::MissingRootType(operation.operation_type.name().to_string())
            })?;

        tracing::trace!(stage = %Stage::Generating);
        let mut generator = Generator::new(
            &self.type_map,
            &fragments,
            &document.sources,
            &self.configuration,
        );
        let plan = generator.root(
            root_type,
            &operation.selection_set,
            operation.operation_type == OperationType::Mutation,
        )?;
        tracing::debug!(
            field_plans = generator.field_plans(),
            schedule = ?plan.schedule,
            "generated plan for {} {}",
            operation.operation_type.name(),
            operation.name.as_ref().map_or("(anonymous)", Name::as_str),
        );

        Ok(Arc::new(CompiledQuery {
            type_map: self.type_map.clone(),
            operation_name: operation.name.as_ref().map(Name::to_string),
            operation_type: operation.operation_type,
            variables: Variables::new(&operation.variables)?,
            plan,
        }))
    }
}

impl fmt::Debug for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compiler")
            .field("configuration", &self.configuration)
            .field("cache", &self.cache.stats())
            .finish()
    }
}

fn select_operation<'doc>(
    document: &'doc ExecutableDocument,
    operation_name: Option<&str>,
) -> Result<&'doc Node<Operation>, CompileError> {
    match operation_name {
        Some(name) => document
            .operations
            .named
            .get(name)
            .ok_or_else(|| CompileError::UnknownOperation(name.to_string())),
        None => {
            let mut operations = document.operations.iter();
            match (operations.next(), operations.next()) {
                (Some(operation), None) => Ok(operation),
                (None, _) => Err(CompileError::NoOperation),
                (Some(_), Some(_)) => Err(CompileError::MultipleOperations),
            }
        }
    }
}

/// Looks for `@defer` or `@stream` in the selections reachable from `root`.
fn incremental_delivery(
    document: &ExecutableDocument,
    root: &SelectionSet,
) -> Option<FallbackReason> {
    let mut visited = HashSet::new();
    let mut stack = vec![root];
    while let Some(selection_set) = stack.pop() {
        for selection in &selection_set.selections {
            match selection {
                Selection::Field(field) => {
                    if field.directives.has(STREAM) {
                        return Some(FallbackReason::Stream);
                    }
                    stack.push(&field.selection_set);
                }
                Selection::InlineFragment(inline) => {
                    if inline.directives.has(DEFER) {
                        return Some(FallbackReason::Defer);
                    }
                    stack.push(&inline.selection_set);
                }
                Selection::FragmentSpread(spread) => {
                    if spread.directives.has(DEFER) {
                        return Some(FallbackReason::Defer);
                    }
                    if visited.insert(&spread.fragment_name)
                        && let Some(fragment) = document.fragments.get(&spread.fragment_name)
                    {
                        stack.push(&fragment.selection_set);
                    }
                }
            }
        }
    }
    None
}

/// Drops comments and insignificant separators outside of string literals,
/// so that operations differing only by formatting share a cache key.
pub(crate) fn normalize_query(query: &str) -> String {
    let mut normalized = String::with_capacity(query.len());
    let mut separated = false;
    let mut rest = query;
    while let Some(c) = rest.chars().next() {
        if c == '#' {
            let end = rest.find(['\n', '\r']).unwrap_or(rest.len());
            rest = &rest[end..];
            separated = true;
            continue;
        }
        if c.is_whitespace() || c == ',' || c == '\u{feff}' {
            rest = &rest[c.len_utf8()..];
            separated = true;
            continue;
        }

        // names and numbers are the only tokens that need a separator
        if separated && normalized.chars().next_back().is_some_and(is_name_char) && is_name_char(c)
        {
            normalized.push(' ');
        }
        separated = false;

        let token_len = if rest.starts_with("\"\"\"") {
            block_string_len(rest)
        } else if c == '"' {
            string_len(rest)
        } else {
            c.len_utf8()
        };
        normalized.push_str(&rest[..token_len]);
        rest = &rest[token_len..];
    }
    normalized
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn string_len(s: &str) -> usize {
    let mut escaped = false;
    for (index, c) in s.char_indices().skip(1) {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' | '\n' | '\r' => return index + c.len_utf8(),
            _ => {}
        }
    }
    s.len()
}

fn block_string_len(s: &str) -> usize {
    let mut index = 3;
    while index < s.len() {
        let tail = &s[index..];
        if tail.starts_with("\\\"\"\"") {
            index += 4;
        } else if tail.starts_with("\"\"\"") {
            return index + 3;
        } else {
            index += tail.chars().next().map_or(1, char::len_utf8);
        }
    }
    s.len()
}

/// A plan specialized for one operation.
///
/// Holds no state between invocations: it can be invoked any number of times,
/// concurrently, with different root values, variables and contexts.
pub struct CompiledQuery {
    type_map: Arc<TypeMap>,
    operation_name: Option<String>,
    operation_type: OperationType,
    variables: Variables,
    plan: SelectionPlan,
}

impl CompiledQuery {
    pub fn operation_name(&self) -> Option<&str> {
        self.operation_name.as_deref()
    }

    pub fn operation_type(&self) -> OperationType {
        self.operation_type
    }

    /// Whether invoking the plan may suspend on an asynchronous resolver.
    pub fn is_async(&self) -> bool {
        self.plan.awaits()
    }

    /// Names of the variables the operation declares.
    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.names()
    }

    /// Renders the plan as an indented tree of fields, with the binding and
    /// the resolver kind of each field and the schedule of each selection set.
    pub fn explain(&self) -> String {
        plan::explain(&self.plan)
    }

    /// Runs the operation against `root`.
    ///
    /// Invalid variables produce a response without `data`. Field errors are
    /// collected in the response and null the nearest nullable position.
    #[tracing::instrument(skip_all, level = "trace", fields(operation_name = ?self.operation_name))]
    pub async fn execute(&self, root: &Value, variables: &Object, context: &Context) -> Response {
        let variables = match self.coerce_variables(variables) {
            Ok(variables) => variables,
            Err(response) => return response,
        };
        let ctx = ExecutionContext::new(&self.type_map, &variables, context);
        let data = execution::execute(&ctx, &self.plan, root).await;
        Response::builder()
            .data(data)
            .errors(ctx.into_errors())
            .build()
    }

    /// Runs the operation without an async runtime.
    ///
    /// Plans containing asynchronous resolvers are driven by a local
    /// executor: their resolvers must not depend on a specific runtime.
    #[tracing::instrument(skip_all, level = "trace", fields(operation_name = ?self.operation_name))]
    pub fn execute_sync(&self, root: &Value, variables: &Object, context: &Context) -> Response {
        if self.is_async() {
            return futures::executor::block_on(self.execute(root, variables, context));
        }
        let variables = match self.coerce_variables(variables) {
            Ok(variables) => variables,
            Err(response) => return response,
        };
        let ctx = ExecutionContext::new(&self.type_map, &variables, context);
        let data = execution::execute_sync(&ctx, &self.plan, root);
        Response::builder()
            .data(data)
            .errors(ctx.into_errors())
            .build()
    }

    fn coerce_variables(&self, variables: &Object) -> Result<Object, Response> {
        self.variables
            .coerce(variables, &self.type_map)
            .map_err(|errors| {
                tracing::debug!(errors = errors.len(), "invalid variables");
                Response::from_errors(
                    errors
                        .iter()
                        .map(ExecutionError::to_graphql_error)
                        .collect(),
                )
            })
    }
}

impl fmt::Debug for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledQuery")
            .field("operation_name", &self.operation_name)
            .field("operation_type", &self.operation_type)
            .field("is_async", &self.is_async())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;
    use test_log::test;

    use super::*;
    use crate::configuration::Cache;
    use crate::configuration::Limits;
    use crate::error::CompileError;
    use crate::spec::Resolvers;

    const SDL: &str = r#"
        type Query {
            hello(name: String = "world"): String
            node: Node
        }
        type Mutation { bump: Int }
        interface Node { id: ID! }
        type User implements Node { id: ID! name: String friend: User }
    "#;

    fn compiler(configuration: Configuration) -> Compiler {
        let resolvers = Resolvers::new().field("Query", "hello", |info| {
            let name = info.argument("name").and_then(|v| v.as_str()).unwrap_or("?");
            Ok(Value::from(format!("hello {name}")))
        });
        Compiler::new(
            Arc::new(TypeMap::parse(SDL, resolvers).unwrap()),
            configuration,
        )
    }

    fn compiled(compiler: &Compiler, query: &str) -> Arc<CompiledQuery> {
        compiler
            .compile(query, None)
            .unwrap()
            .compiled()
            .cloned()
            .unwrap()
    }

    #[test]
    fn normalization_ignores_formatting() {
        assert_eq!(
            normalize_query(
                "query Q($a: Int,  $b: Int) {\n  # comment\n  f(a: $a, b: $b) { x y }\n}"
            ),
            "query Q($a:Int $b:Int){f(a:$a b:$b){x y}}"
        );
        assert_eq!(
            normalize_query("{ f(s: \"a  # b\") }"),
            normalize_query("{f(s:\"a  # b\")}")
        );
        assert_eq!(
            normalize_query("{ f(s: \"\"\" x \\\"\"\"  y \"\"\") }"),
            "{f(s:\"\"\" x \\\"\"\"  y \"\"\")}"
        );
        assert_ne!(normalize_query("{ f(s: \"a b\") }"), normalize_query("{ f(s: \"ab\") }"));
    }

    #[test]
    fn operation_selection() {
        let compiler = compiler(Configuration::default());
        let query = "query A { hello } query B { hello(name: \"b\") }";
        assert_eq!(
            compiler.compile(query, None).unwrap_err(),
            CompileError::MultipleOperations
        );
        assert_eq!(
            compiler.compile(query, Some("C")).unwrap_err(),
            CompileError::UnknownOperation("C".to_string())
        );
        let b = compiler.compile(query, Some("B")).unwrap();
        assert_eq!(b.compiled().unwrap().operation_name(), Some("B"));
    }

    #[test]
    fn parse_and_validation_errors() {
        let compiler = compiler(Configuration::default());
        assert!(matches!(
            compiler.compile("{ hello", None),
            Err(CompileError::ParsingError(_))
        ));
        assert!(matches!(
            compiler.compile("{ nope }", None),
            Err(CompileError::ParsingError(_) | CompileError::ValidationError(_))
        ));
        assert!(matches!(
            compiler.compile("{ node }", None),
            Err(CompileError::ParsingError(_) | CompileError::ValidationError(_))
        ));
    }

    #[test]
    fn defer_and_stream_fall_back() {
        let compiler = compiler(Configuration::default());
        let deferred = compiler
            .compile("{ node { ... on User @defer { name } } }", None)
            .unwrap();
        assert!(matches!(
            deferred,
            Compilation::Fallback(FallbackReason::Defer)
        ));
        let streamed = compiler
            .compile("{ node { id } hello @stream }", None)
            .unwrap();
        assert!(matches!(
            streamed,
            Compilation::Fallback(FallbackReason::Stream)
        ));
        assert_eq!(compiler.cache_stats().size, 2);
    }

    #[test]
    fn operation_errors_come_before_fallback() {
        let compiler = compiler(Configuration::default());
        assert_eq!(
            compiler
                .compile(
                    "query A { hello } query B { node { ... on User @defer { name } } }",
                    None
                )
                .unwrap_err(),
            CompileError::MultipleOperations
        );
        assert_eq!(
            compiler
                .compile("query A { hello @stream }", Some("Nope"))
                .unwrap_err(),
            CompileError::UnknownOperation("Nope".to_string())
        );
        assert!(matches!(
            compiler.compile("{ node { ... on User @defer { name } } ", None),
            Err(CompileError::ParsingError(_))
        ));
        assert_eq!(compiler.cache_stats().size, 0);
    }

    #[test]
    fn only_the_selected_operation_falls_back() {
        let compiler = compiler(Configuration::default());
        let query = "query A { hello } query B { node { ... on User @defer { name } } }";
        let b = compiler.compile(query, Some("B")).unwrap();
        assert!(matches!(b, Compilation::Fallback(FallbackReason::Defer)));

        // @defer is not declared by the schema: the rest of the document is
        // still validated as a whole
        assert!(matches!(
            compiler.compile(query, Some("A")),
            Err(CompileError::ParsingError(_) | CompileError::ValidationError(_))
        ));
    }

    #[test]
    fn cache_hits_skip_compilation() {
        let compiler = compiler(Configuration::default());
        let first = compiled(&compiler, "{ hello }");
        let second = compiled(&compiler, "{\n  hello\n}");
        assert!(Arc::ptr_eq(&first, &second));
        let stats = compiler.cache_stats();
        assert_eq!((stats.hits, stats.misses, stats.size), (1, 1, 1));

        compiler.clear_cache();
        let third = compiled(&compiler, "{ hello }");
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn errors_are_not_cached() {
        let compiler = compiler(Configuration::default());
        assert!(compiler.compile("{ hello", None).is_err());
        assert_eq!(compiler.cache_stats().size, 0);
    }

    #[test]
    fn disabled_cache_compiles_every_time() {
        let compiler = compiler(
            Configuration::builder()
                .cache(Cache::builder().capacity(0).build())
                .build(),
        );
        let first = compiled(&compiler, "{ hello }");
        let second = compiled(&compiler, "{ hello }");
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(compiler.cache_stats().size, 0);
    }

    #[test]
    fn missing_root_type() {
        let compiler = Compiler::new(
            Arc::new(TypeMap::parse("type Query { a: Int }", Resolvers::new()).unwrap()),
            Configuration::default(),
        );
        assert!(matches!(
            compiler.compile("mutation { a }", None),
            Err(
                CompileError::ParsingError(_)
                    | CompileError::ValidationError(_)
                    | CompileError::MissingRootType(_)
            )
        ));
    }

    #[test]
    fn limits_abort_compilation() {
        let deep = compiler(
            Configuration::builder()
                .limits(Limits::builder().max_depth(2).build())
                .build(),
        );
        assert_eq!(
            deep.compile("{ node { ... on User { friend { friend { name } } } } }", None)
                .unwrap_err(),
            CompileError::RecursionLimitExceeded
        );
        assert_eq!(deep.cache_stats().size, 0);

        let small = compiler(
            Configuration::builder()
                .limits(Limits::builder().max_plan_nodes(2).build())
                .build(),
        );
        assert_eq!(
            small.compile("{ a: hello b: hello c: hello }", None).unwrap_err(),
            CompileError::PlanTooLarge(2)
        );
    }

    #[test]
    fn sync_execution() {
        let compiler = compiler(Configuration::default());
        let query = compiled(&compiler, "query($n: String) { hello(name: $n) default: hello }");
        assert!(!query.is_async());
        assert_eq!(query.variable_names().collect::<Vec<_>>(), vec!["n"]);
        let response = query.execute_sync(
            &json!({}),
            json!({"n": "jit"}).as_object().unwrap(),
            &Context::new(),
        );
        assert!(response.errors.is_empty());
        assert_eq_and_ordered!(
            response.data.unwrap(),
            json!({"hello": "hello jit", "default": "hello world"})
        );
    }

    #[test]
    fn explain_lists_fields() {
        let compiler = compiler(Configuration::default());
        let query = compiled(&compiler, "{ hello node { id ... on User { name } } }");
        let explained = query.explain();
        assert!(explained.starts_with("Query (sync)\n"));
        assert!(explained.contains("hello: hello [hello] sync"));
        assert!(explained.contains("User (sync)"));
        assert!(explained.contains("name: name [node_user_name] property"));
    }
}

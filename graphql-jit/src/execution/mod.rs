//! Runs compiled plans against a root value.
//!
//! Every position returns `Err(InvalidValue)` once its error is recorded. The
//! error travels up until a position allowed to hold `null` is found: that
//! position becomes `null` and its siblings are kept.

use std::fmt;

use futures::FutureExt;
use futures::future::BoxFuture;
use futures::future::join_all;
use parking_lot::Mutex;

use crate::compiler::introspection;
use crate::compiler::plan::AbstractPlan;
use crate::compiler::plan::Completion;
use crate::compiler::plan::FieldKind;
use crate::compiler::plan::FieldPlan;
use crate::compiler::plan::Leaf;
use crate::compiler::plan::Schedule;
use crate::compiler::plan::SelectionPlan;
use crate::context::Context;
use crate::graphql;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::PathElement;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::json_ext::inspect;
use crate::spec::FieldError;
use crate::spec::InvalidValue;
use crate::spec::ResolveInfo;
use crate::spec::ResolverBinding;
use crate::spec::TypeKind;
use crate::spec::TypeMap;

/// Position of a value in the response, borrowed from the enclosing positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponsePath<'a> {
    Root,
    Key(&'a ResponsePath<'a>, &'a str),
    Index(&'a ResponsePath<'a>, usize),
}

impl ResponsePath<'_> {
    /// Converts to the owned path reported in errors.
    pub fn to_path(&self) -> Path {
        let mut elements = Vec::new();
        let mut current = self;
        loop {
            match current {
                ResponsePath::Root => break,
                ResponsePath::Key(parent, key) => {
                    elements.push(PathElement::Key(key.to_string()));
                    current = parent;
                }
                ResponsePath::Index(parent, index) => {
                    elements.push(PathElement::Index(*index));
                    current = parent;
                }
            }
        }
        elements.reverse();
        Path(elements)
    }
}

impl fmt::Display for ResponsePath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_path().fmt(f)
    }
}

/// State of one invocation.
pub(crate) struct ExecutionContext<'a> {
    type_map: &'a TypeMap,
    variables: &'a Object,
    context: &'a Context,
    errors: Mutex<Vec<graphql::Error>>,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(type_map: &'a TypeMap, variables: &'a Object, context: &'a Context) -> Self {
        Self {
            type_map,
            variables,
            context,
            errors: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn into_errors(self) -> Vec<graphql::Error> {
        self.errors.into_inner()
    }

    fn field_error(
        &self,
        field: &FieldPlan,
        path: &ResponsePath<'_>,
        message: String,
        extensions: Object,
    ) -> InvalidValue {
        tracing::trace!(path = %path, binding = %field.binding, "{message}");
        let error = graphql::Error::builder()
            .message(message)
            .locations(field.locations.clone())
            .path(path.to_path())
            .extensions(extensions)
            .build();
        self.errors.lock().push(error);
        InvalidValue
    }

    fn resolver_error(
        &self,
        field: &FieldPlan,
        path: &ResponsePath<'_>,
        error: FieldError,
    ) -> InvalidValue {
        self.field_error(field, path, error.message, error.extensions)
    }
}

/// Keeps a failed position as `null`, unless it is non-null.
fn settle(non_null: bool, result: Result<Value, InvalidValue>) -> Result<Value, InvalidValue> {
    match result {
        Err(invalid) if non_null => Err(invalid),
        Err(_) => Ok(Value::Null),
        Ok(value) => Ok(value),
    }
}

/// Runs a plan that never suspends. `null` when a non-null root field failed.
pub(crate) fn execute_sync(
    ctx: &ExecutionContext<'_>,
    plan: &SelectionPlan,
    root: &Value,
) -> Value {
    execute_selection_sync(ctx, plan, root, &ResponsePath::Root).unwrap_or(Value::Null)
}

/// Runs a plan. `null` when a non-null root field failed.
pub(crate) async fn execute<'a>(
    ctx: &'a ExecutionContext<'a>,
    plan: &'a SelectionPlan,
    root: &'a Value,
) -> Value {
    execute_selection(ctx, plan, root, &ResponsePath::Root)
        .await
        .unwrap_or(Value::Null)
}

fn execute_selection_sync(
    ctx: &ExecutionContext<'_>,
    plan: &SelectionPlan,
    parent: &Value,
    path: &ResponsePath<'_>,
) -> Result<Value, InvalidValue> {
    let mut object = Object::new();
    for field in &plan.fields {
        if !field.guard.eval(ctx.variables) {
            continue;
        }
        let value = settle(
            field.is_non_null(),
            execute_field_sync(ctx, field, parent, path),
        )?;
        object.insert(field.response_key.as_str(), value);
    }
    Ok(Value::Object(object))
}

fn execute_selection<'a>(
    ctx: &'a ExecutionContext<'a>,
    plan: &'a SelectionPlan,
    parent: &'a Value,
    path: &'a ResponsePath<'a>,
) -> BoxFuture<'a, Result<Value, InvalidValue>> {
    async move {
        match plan.schedule {
            Schedule::Sync => execute_selection_sync(ctx, plan, parent, path),
            Schedule::Serial => {
                let mut object = Object::new();
                for field in &plan.fields {
                    if !field.guard.eval(ctx.variables) {
                        continue;
                    }
                    let result = if field.awaits() {
                        execute_field(ctx, field, parent, path).await
                    } else {
                        execute_field_sync(ctx, field, parent, path)
                    };
                    object.insert(
                        field.response_key.as_str(),
                        settle(field.is_non_null(), result)?,
                    );
                }
                Ok(Value::Object(object))
            }
            Schedule::Concurrent => execute_concurrently(ctx, plan, parent, path).await,
        }
    }
    .boxed()
}

enum Slot {
    Skipped,
    Pending,
    Ready(Result<Value, InvalidValue>),
}

/// Synchronous fields run in query order while awaiting fields are only
/// collected, then every awaiting field is polled together. The object is
/// assembled in query order whatever the completion order.
///
/// A failed non-null synchronous field stops the remaining fields from
/// starting; awaiting fields already collected still run to completion.
async fn execute_concurrently<'a>(
    ctx: &'a ExecutionContext<'a>,
    plan: &'a SelectionPlan,
    parent: &'a Value,
    path: &'a ResponsePath<'a>,
) -> Result<Value, InvalidValue> {
    let mut slots = Vec::with_capacity(plan.fields.len());
    let mut pending = Vec::new();
    let mut failed = false;
    for field in &plan.fields {
        if !field.guard.eval(ctx.variables) {
            slots.push(Slot::Skipped);
            continue;
        }
        if field.awaits() {
            pending.push(execute_field(ctx, field, parent, path));
            slots.push(Slot::Pending);
            continue;
        }
        let result = execute_field_sync(ctx, field, parent, path);
        if result.is_err() && field.is_non_null() {
            failed = true;
            break;
        }
        slots.push(Slot::Ready(result));
    }

    let mut results = join_all(pending).await.into_iter();
    if failed {
        return Err(InvalidValue);
    }

    let mut object = Object::new();
    for (field, slot) in plan.fields.iter().zip(slots) {
        let result = match slot {
            Slot::Skipped => continue,
            Slot::Ready(result) => result,
            Slot::Pending => results.next().unwrap_or(Err(InvalidValue)),
        };
        match settle(field.is_non_null(), result) {
            Ok(value) => {
                object.insert(field.response_key.as_str(), value);
            }
            Err(_) => failed = true,
        }
    }
    if failed {
        Err(InvalidValue)
    } else {
        Ok(Value::Object(object))
    }
}

fn execute_field_sync(
    ctx: &ExecutionContext<'_>,
    field: &FieldPlan,
    parent: &Value,
    path: &ResponsePath<'_>,
) -> Result<Value, InvalidValue> {
    let path = ResponsePath::Key(path, &field.response_key);
    let (resolver, arguments, completion) = match &field.kind {
        FieldKind::Resolve {
            resolver,
            arguments,
            completion,
        } => (resolver, arguments, completion),
        other => return Ok(execute_meta_field(ctx, field, other)),
    };

    let arguments = arguments.resolve(ctx.variables);
    let info = resolve_info(ctx, field, parent, &arguments, &path);
    let resolved = match resolver {
        ResolverBinding::Property => Ok(info.property()),
        ResolverBinding::Sync(resolver) => resolver(info),
        ResolverBinding::Async(_) => {
            failfast_error!(
                field = %field.binding,
                "asynchronous resolver reached from a synchronous plan"
            );
            return Err(ctx.field_error(
                field,
                &path,
                "internal error: asynchronous resolver in a synchronous plan".to_string(),
                Object::new(),
            ));
        }
    };
    match resolved {
        Ok(value) => complete_sync(ctx, field, completion, &value, &path),
        Err(error) => Err(ctx.resolver_error(field, &path, error)),
    }
}

fn execute_field<'a>(
    ctx: &'a ExecutionContext<'a>,
    field: &'a FieldPlan,
    parent: &'a Value,
    path: &'a ResponsePath<'a>,
) -> BoxFuture<'a, Result<Value, InvalidValue>> {
    let FieldKind::Resolve {
        resolver,
        arguments,
        completion,
    } = &field.kind
    else {
        return futures::future::ready(execute_field_sync(ctx, field, parent, path)).boxed();
    };

    async move {
        let path = ResponsePath::Key(path, &field.response_key);
        let arguments = arguments.resolve(ctx.variables);
        let info = resolve_info(ctx, field, parent, &arguments, &path);
        let resolved = match resolver {
            ResolverBinding::Property => Ok(info.property()),
            ResolverBinding::Sync(resolver) => resolver(info),
            ResolverBinding::Async(resolver) => resolver(info).await,
        };
        match resolved {
            Ok(value) => complete(ctx, field, completion, &value, &path).await,
            Err(error) => Err(ctx.resolver_error(field, &path, error)),
        }
    }
    .boxed()
}

fn resolve_info<'a>(
    ctx: &'a ExecutionContext<'_>,
    field: &'a FieldPlan,
    parent: &'a Value,
    arguments: &'a Object,
    path: &'a ResponsePath<'a>,
) -> ResolveInfo<'a> {
    ResolveInfo {
        parent,
        arguments,
        context: ctx.context,
        variables: ctx.variables,
        parent_type: &field.parent_type,
        field_name: &field.field_name,
        path,
    }
}

fn execute_meta_field(ctx: &ExecutionContext<'_>, field: &FieldPlan, kind: &FieldKind) -> Value {
    match kind {
        FieldKind::Typename => Value::from(field.parent_type.as_str()),
        FieldKind::Constant(value) => value.clone(),
        FieldKind::Introspection {
            root,
            arguments,
            selection,
        } => introspection::evaluate(
            ctx.type_map,
            *root,
            &arguments.resolve(ctx.variables),
            selection,
            ctx.variables,
        ),
        FieldKind::Resolve { .. } => Value::Null,
    }
}

fn complete_sync(
    ctx: &ExecutionContext<'_>,
    field: &FieldPlan,
    completion: &Completion,
    value: &Value,
    path: &ResponsePath<'_>,
) -> Result<Value, InvalidValue> {
    match completion {
        Completion::NonNull(inner) => {
            let completed = complete_sync(ctx, field, inner, value, path)?;
            non_null(ctx, field, completed, path)
        }
        _ if value.is_null() => Ok(Value::Null),
        Completion::List { item, .. } => {
            let items = as_list(ctx, field, value, path)?;
            let mut completed = Vec::with_capacity(items.len());
            for (index, element) in items.iter().enumerate() {
                let path = ResponsePath::Index(path, index);
                completed.push(settle(
                    item.is_non_null(),
                    complete_sync(ctx, field, item, element, &path),
                )?);
            }
            Ok(Value::Array(completed))
        }
        Completion::Leaf(leaf) => serialize_leaf(leaf, value)
            .map_err(|message| ctx.field_error(field, path, message, Object::new())),
        Completion::Object(plan) => execute_selection_sync(ctx, plan, value, path),
        Completion::Abstract(plan) => {
            let plan = runtime_plan(ctx, field, plan, value, path)?;
            execute_selection_sync(ctx, plan, value, path)
        }
    }
}

fn complete<'a>(
    ctx: &'a ExecutionContext<'a>,
    field: &'a FieldPlan,
    completion: &'a Completion,
    value: &'a Value,
    path: &'a ResponsePath<'a>,
) -> BoxFuture<'a, Result<Value, InvalidValue>> {
    if !completion.awaits() {
        return futures::future::ready(complete_sync(ctx, field, completion, value, path)).boxed();
    }

    async move {
        match completion {
            Completion::NonNull(inner) => {
                let completed = complete(ctx, field, inner, value, path).await?;
                non_null(ctx, field, completed, path)
            }
            _ if value.is_null() => Ok(Value::Null),
            Completion::List { item, concurrent } => {
                let items = as_list(ctx, field, value, path)?;
                let results = if *concurrent {
                    join_all(items.iter().enumerate().map(|(index, element)| {
                        complete_item(ctx, field, item, element, path, index)
                    }))
                    .await
                } else {
                    let mut results = Vec::with_capacity(items.len());
                    for (index, element) in items.iter().enumerate() {
                        results.push(complete_item(ctx, field, item, element, path, index).await);
                    }
                    results
                };
                let mut completed = Vec::with_capacity(results.len());
                for result in results {
                    completed.push(settle(item.is_non_null(), result)?);
                }
                Ok(Value::Array(completed))
            }
            Completion::Leaf(_) => complete_sync(ctx, field, completion, value, path),
            Completion::Object(plan) => execute_selection(ctx, plan, value, path).await,
            Completion::Abstract(plan) => {
                let plan = runtime_plan(ctx, field, plan, value, path)?;
                execute_selection(ctx, plan, value, path).await
            }
        }
    }
    .boxed()
}

fn complete_item<'a>(
    ctx: &'a ExecutionContext<'a>,
    field: &'a FieldPlan,
    item: &'a Completion,
    element: &'a Value,
    path: &'a ResponsePath<'a>,
    index: usize,
) -> BoxFuture<'a, Result<Value, InvalidValue>> {
    async move {
        let path = ResponsePath::Index(path, index);
        complete(ctx, field, item, element, &path).await
    }
    .boxed()
}

fn non_null(
    ctx: &ExecutionContext<'_>,
    field: &FieldPlan,
    completed: Value,
    path: &ResponsePath<'_>,
) -> Result<Value, InvalidValue> {
    if completed.is_null() {
        Err(ctx.field_error(
            field,
            path,
            format!(
                "Cannot return null for non-nullable field {}.{}.",
                field.parent_type, field.field_name
            ),
            Object::new(),
        ))
    } else {
        Ok(completed)
    }
}

fn as_list<'v>(
    ctx: &ExecutionContext<'_>,
    field: &FieldPlan,
    value: &'v Value,
    path: &ResponsePath<'_>,
) -> Result<&'v Vec<Value>, InvalidValue> {
    value.as_array().ok_or_else(|| {
        ctx.field_error(
            field,
            path,
            format!(
                "Expected Iterable, but did not find one for field \"{}.{}\".",
                field.parent_type, field.field_name
            ),
            Object::new(),
        )
    })
}

/// Finds the plan of the concrete type of an interface or union value.
fn runtime_plan<'p>(
    ctx: &ExecutionContext<'_>,
    field: &FieldPlan,
    plan: &'p AbstractPlan,
    value: &Value,
    path: &ResponsePath<'_>,
) -> Result<&'p SelectionPlan, InvalidValue> {
    let abstract_type = &plan.type_name;
    let runtime_type = match &plan.type_resolver {
        Some(type_resolver) => type_resolver(value, ctx.context),
        None => value.typename().map(str::to_string),
    };
    let message = match runtime_type {
        None => format!(
            "Abstract type \"{abstract_type}\" must resolve to an Object type at runtime \
             for field \"{}.{}\". Either the \"{abstract_type}\" type should provide a \
             \"resolveType\" function or each possible type should provide an \"isTypeOf\" \
             function.",
            field.parent_type, field.field_name
        ),
        Some(runtime_type) => {
            if let Some(plan) = plan.possible_types.get(runtime_type.as_str()) {
                return Ok(plan);
            }
            match ctx.type_map.get(&runtime_type) {
                None => format!(
                    "Abstract type \"{abstract_type}\" was resolved to a type \
                     \"{runtime_type}\" that does not exist inside the schema."
                ),
                Some(descriptor) if descriptor.kind != TypeKind::Object => format!(
                    "Abstract type \"{abstract_type}\" was resolved to a non-object type \
                     \"{runtime_type}\"."
                ),
                Some(_) => format!(
                    "Runtime Object type \"{runtime_type}\" is not a possible type for \
                     \"{abstract_type}\"."
                ),
            }
        }
    };
    Err(ctx.field_error(field, path, message, Object::new()))
}

fn serialize_leaf(leaf: &Leaf, value: &Value) -> Result<Value, String> {
    match leaf {
        Leaf::Int => serialize_int(value),
        Leaf::Float => serialize_float(value),
        Leaf::String => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Bool(boolean) => Ok(Value::from(boolean.to_string())),
            Value::Number(number) if value.as_f64().is_some_and(f64::is_finite) => {
                Ok(Value::from(number.to_string()))
            }
            _ => Err(format!("String cannot represent value: {}", inspect(value))),
        },
        Leaf::Boolean => match value.as_f64() {
            _ if value.is_boolean() => Ok(value.clone()),
            Some(number) if number.is_finite() => Ok(Value::Bool(number != 0.0)),
            _ => Err(format!(
                "Boolean cannot represent a non boolean value: {}",
                inspect(value)
            )),
        },
        Leaf::Id => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(number) if number.is_i64() || number.is_u64() => {
                Ok(Value::from(number.to_string()))
            }
            _ => Err(format!("ID cannot represent value: {}", inspect(value))),
        },
        Leaf::Enum { name, values } => match value.as_str() {
            Some(variant) if values.contains(variant) => Ok(value.clone()),
            _ => Err(format!("Enum \"{name}\" cannot represent value: {}", inspect(value))),
        },
        Leaf::Scalar { serializer, .. } => match serializer {
            Some(serializer) => serializer(value).map_err(|error| error.message),
            None => Ok(value.clone()),
        },
    }
}

fn serialize_int(value: &Value) -> Result<Value, String> {
    let number = match value {
        Value::Bool(boolean) => return Ok(Value::from(i32::from(*boolean))),
        Value::Number(_) => value.as_f64(),
        Value::String(string) if !string.as_str().is_empty() => {
            string.as_str().trim().parse::<f64>().ok()
        }
        _ => None,
    };
    let number = match number {
        Some(number) if number.fract() == 0.0 => number,
        _ => return Err(format!("Int cannot represent non-integer value: {}", inspect(value))),
    };
    if number > f64::from(i32::MAX) || number < f64::from(i32::MIN) {
        return Err(format!(
            "Int cannot represent non 32-bit signed integer value: {}",
            inspect(value)
        ));
    }
    Ok(Value::from(number as i32))
}

fn serialize_float(value: &Value) -> Result<Value, String> {
    match value {
        Value::Bool(boolean) => Ok(Value::from(i32::from(*boolean))),
        Value::Number(_) if value.as_f64().is_some_and(f64::is_finite) => Ok(value.clone()),
        Value::String(string) => match string.as_str().trim().parse::<f64>() {
            Ok(number) if number.is_finite() && !string.as_str().trim().is_empty() => {
                Ok(Value::from(number))
            }
            _ => Err(format!("Float cannot represent non numeric value: {}", inspect(value))),
        },
        _ => Err(format!("Float cannot represent non numeric value: {}", inspect(value))),
    }
}

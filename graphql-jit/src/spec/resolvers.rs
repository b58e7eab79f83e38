use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json_bytes::ByteString;

use crate::context::Context;
use crate::execution::ResponsePath;
use crate::json_ext::Object;
use crate::json_ext::Value;

/// What a resolver returns: the raw value of the field, completed against the
/// field's type by the compiled plan.
pub type ResolverResult = Result<Value, FieldError>;

pub(crate) type SyncResolverFn = dyn Fn(ResolveInfo<'_>) -> ResolverResult + Send + Sync;
pub(crate) type AsyncResolverFn =
    dyn for<'a> Fn(ResolveInfo<'a>) -> BoxFuture<'a, ResolverResult> + Send + Sync;
pub(crate) type TypeResolverFn = dyn Fn(&Value, &Context) -> Option<String> + Send + Sync;
pub(crate) type SerializerFn = dyn Fn(&Value) -> ResolverResult + Send + Sync;

/// How a field obtains its value. Decided once when the type map is built.
#[derive(Clone)]
pub(crate) enum ResolverBinding {
    /// Reads the field's name on the parent object.
    Property,
    Sync(Arc<SyncResolverFn>),
    Async(Arc<AsyncResolverFn>),
}

impl ResolverBinding {
    pub(crate) fn is_async(&self) -> bool {
        matches!(self, ResolverBinding::Async(_))
    }
}

impl fmt::Debug for ResolverBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolverBinding::Property => f.write_str("Property"),
            ResolverBinding::Sync(_) => f.write_str("Sync"),
            ResolverBinding::Async(_) => f.write_str("Async"),
        }
    }
}

/// Everything a resolver gets to see about the field it resolves.
#[derive(Clone, Copy)]
pub struct ResolveInfo<'a> {
    /// The value of the parent object: the root value for root fields.
    pub parent: &'a Value,
    /// Coerced argument values, defaults applied.
    pub arguments: &'a Object,
    pub context: &'a Context,
    /// Coerced variables of the operation.
    pub variables: &'a Object,
    pub parent_type: &'a str,
    pub field_name: &'a str,
    /// Where the field lands in the response.
    pub path: &'a ResponsePath<'a>,
}

impl<'a> ResolveInfo<'a> {
    /// Returns the value of an argument, if it was provided or has a default.
    pub fn argument(&self, name: &str) -> Option<&'a Value> {
        self.arguments.get(name)
    }

    /// Reads the field's name on the parent object, like fields without a
    /// resolver do.
    pub fn property(&self) -> Value {
        self.parent
            .as_object()
            .and_then(|parent| parent.get(self.field_name))
            .cloned()
            .unwrap_or(Value::Null)
    }
}

/// An error raised by a resolver. It is reported at the field's path and
/// nulls the nearest nullable position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub message: String,
    pub extensions: Object,
}

impl FieldError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            extensions: Object::new(),
        }
    }

    /// Adds an entry to the `extensions` of the reported error.
    pub fn with_extension(mut self, key: impl Into<ByteString>, value: impl Into<Value>) -> Self {
        self.extensions.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl<E> From<E> for FieldError
where
    E: std::error::Error,
{
    fn from(error: E) -> Self {
        FieldError::new(error.to_string())
    }
}

/// Resolver registrations, turned into a [`TypeMap`](crate::TypeMap) together
/// with a schema.
///
/// Fields without a resolver read the property named like the field on their
/// parent value. Resolvers registered on an interface field are used by the
/// implementing object types that do not register their own.
#[derive(Clone, Default)]
pub struct Resolvers {
    pub(crate) fields: HashMap<(String, String), ResolverBinding>,
    pub(crate) type_resolvers: HashMap<String, Arc<TypeResolverFn>>,
    pub(crate) serializers: HashMap<String, Arc<SerializerFn>>,
}

impl Resolvers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a synchronous resolver for `type_name.field_name`.
    pub fn field<F>(mut self, type_name: &str, field_name: &str, resolver: F) -> Self
    where
        F: Fn(ResolveInfo<'_>) -> ResolverResult + Send + Sync + 'static,
    {
        self.fields.insert(
            (type_name.to_string(), field_name.to_string()),
            ResolverBinding::Sync(Arc::new(resolver)),
        );
        self
    }

    /// Registers an asynchronous resolver for `type_name.field_name`.
    ///
    /// ```rust
    /// use futures::FutureExt;
    /// use graphql_jit::Resolvers;
    /// use serde_json_bytes::json;
    ///
    /// let resolvers = Resolvers::new().field_async("Query", "hello", |_info| {
    ///     async move { Ok(json!("world")) }.boxed()
    /// });
    /// ```
    pub fn field_async<F>(mut self, type_name: &str, field_name: &str, resolver: F) -> Self
    where
        F: for<'a> Fn(ResolveInfo<'a>) -> BoxFuture<'a, ResolverResult> + Send + Sync + 'static,
    {
        self.fields.insert(
            (type_name.to_string(), field_name.to_string()),
            ResolverBinding::Async(Arc::new(resolver)),
        );
        self
    }

    /// Registers how the concrete type of an interface or union value is found.
    /// Without one, the `__typename` property of the value is used.
    pub fn type_resolver<F>(mut self, type_name: &str, resolver: F) -> Self
    where
        F: Fn(&Value, &Context) -> Option<String> + Send + Sync + 'static,
    {
        self.type_resolvers
            .insert(type_name.to_string(), Arc::new(resolver));
        self
    }

    /// Registers the serialization of a custom scalar. Without one, values of
    /// the scalar are passed through unchanged.
    pub fn scalar<F>(mut self, type_name: &str, serializer: F) -> Self
    where
        F: Fn(&Value) -> ResolverResult + Send + Sync + 'static,
    {
        self.serializers
            .insert(type_name.to_string(), Arc::new(serializer));
        self
    }
}

impl fmt::Debug for Resolvers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolvers")
            .field("fields", &self.fields)
            .field("type_resolvers", &self.type_resolvers.keys())
            .field("serializers", &self.serializers.keys())
            .finish()
    }
}

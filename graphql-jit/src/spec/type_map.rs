use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Schema;
use apollo_compiler::ast;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::validation::Valid;
use indexmap::IndexMap;
use indexmap::IndexSet;

use crate::compiler::serialize_constant;
use crate::error::BuildError;
use crate::json_ext::Value;
use crate::spec::FieldType;
use crate::spec::ResolverBinding;
use crate::spec::Resolvers;
use crate::spec::SerializerFn;
use crate::spec::TypeResolverFn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TypeKind {
    Scalar,
    Object,
    Interface,
    Union,
    Enum,
    InputObject,
}

impl TypeKind {
    pub(crate) fn is_abstract(&self) -> bool {
        matches!(self, TypeKind::Interface | TypeKind::Union)
    }
}

/// An argument or input field.
#[derive(Debug, Clone)]
pub(crate) struct InputValueSpec {
    pub(crate) ty: FieldType,
    pub(crate) default: Option<Value>,
}

pub(crate) struct FieldDescriptor {
    pub(crate) ty: ast::Type,
    pub(crate) arguments: IndexMap<Name, InputValueSpec>,
    pub(crate) resolver: ResolverBinding,
}

impl FieldDescriptor {
    #[cfg(test)]
    pub(crate) fn is_async(&self) -> bool {
        self.resolver.is_async()
    }
}

/// What the compiler knows about one schema type.
pub(crate) struct TypeDescriptor {
    pub(crate) name: Name,
    pub(crate) kind: TypeKind,
    pub(crate) fields: IndexMap<Name, FieldDescriptor>,
    /// Concrete object types a value of this type can have at runtime.
    pub(crate) possible_types: IndexSet<Name>,
    pub(crate) type_resolver: Option<Arc<TypeResolverFn>>,
    pub(crate) serializer: Option<Arc<SerializerFn>>,
    pub(crate) enum_values: IndexSet<Name>,
    pub(crate) input_fields: IndexMap<Name, InputValueSpec>,
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("fields", &self.fields.keys())
            .field("possible_types", &self.possible_types)
            .finish()
    }
}

/// The read-only view of a schema that compilation works from: one
/// descriptor per type, with the resolver bound to every field.
///
/// Built once per schema and shared by every compilation.
pub struct TypeMap {
    schema: Arc<Valid<Schema>>,
    types: HashMap<Name, TypeDescriptor>,
}

impl fmt::Debug for TypeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeMap")
            .field("types", &self.types.len())
            .finish()
    }
}

const BUILTIN_SCALARS: [&str; 5] = ["Int", "Float", "String", "Boolean", "ID"];

impl TypeMap {
    /// Parses and validates a schema, then binds the resolvers to it.
    pub fn parse(sdl: &str, resolvers: Resolvers) -> Result<Self, BuildError> {
        let schema = Schema::parse_and_validate(sdl, "schema.graphql")
            .map_err(|e| BuildError::InvalidSchema((&e.errors).into()))?;
        Self::new(schema, resolvers)
    }

    #[tracing::instrument(skip_all, level = "trace")]
    pub fn new(
        schema: impl Into<Arc<Valid<Schema>>>,
        resolvers: Resolvers,
    ) -> Result<Self, BuildError> {
        let schema = schema.into();
        let Resolvers {
            fields: mut field_resolvers,
            mut type_resolvers,
            mut serializers,
        } = resolvers;

        let mut types = HashMap::with_capacity(schema.types.len());
        for (name, ty) in &schema.types {
            let kind = match ty {
                ExtendedType::Scalar(_) => TypeKind::Scalar,
                ExtendedType::Object(_) => TypeKind::Object,
                ExtendedType::Interface(_) => TypeKind::Interface,
                ExtendedType::Union(_) => TypeKind::Union,
                ExtendedType::Enum(_) => TypeKind::Enum,
                ExtendedType::InputObject(_) => TypeKind::InputObject,
            };

            let type_resolver = type_resolvers.remove(name.as_str());
            if type_resolver.is_some() && !kind.is_abstract() {
                return Err(BuildError::NotAbstract(name.to_string()));
            }
            let serializer = serializers.remove(name.as_str());
            if serializer.is_some() {
                if kind != TypeKind::Scalar {
                    return Err(BuildError::NotScalar(name.to_string()));
                }
                if BUILTIN_SCALARS.contains(&name.as_str()) {
                    return Err(BuildError::BuiltinScalar(name.to_string()));
                }
            }

            let (fields, interfaces): (_, Vec<Name>) = match ty {
                ExtendedType::Object(object) => (
                    Some(&object.fields),
                    object
                        .implements_interfaces
                        .iter()
                        .map(|i| i.name.clone())
                        .collect(),
                ),
                ExtendedType::Interface(interface) => (
                    Some(&interface.fields),
                    interface
                        .implements_interfaces
                        .iter()
                        .map(|i| i.name.clone())
                        .collect(),
                ),
                _ => (None, Vec::new()),
            };

            let mut descriptors = IndexMap::new();
            for (field_name, definition) in fields.into_iter().flatten() {
                let inner = definition.ty.inner_named_type();
                if !schema.types.contains_key(inner) {
                    return Err(BuildError::UnknownType(inner.to_string()));
                }
                let key = (name.to_string(), field_name.to_string());
                let resolver = match field_resolvers.get(&key) {
                    Some(resolver) => resolver.clone(),
                    None => inherited_resolver(&field_resolvers, &interfaces, field_name),
                };
                descriptors.insert(
                    field_name.clone(),
                    FieldDescriptor {
                        ty: definition.ty.clone(),
                        arguments: input_values(
                            &schema,
                            &format!("{name}.{field_name}"),
                            &definition.arguments,
                            true,
                        )?,
                        resolver,
                    },
                );
            }

            let input_fields = match ty {
                ExtendedType::InputObject(input) => {
                    let definitions = input
                        .fields
                        .values()
                        .map(|field| field.node.clone())
                        .collect::<Vec<_>>();
                    input_values(&schema, name, &definitions, false)?
                }
                _ => IndexMap::new(),
            };

            let enum_values = match ty {
                ExtendedType::Enum(enum_type) => enum_type.values.keys().cloned().collect(),
                _ => IndexSet::new(),
            };

            let possible_types = match ty {
                ExtendedType::Object(_) => IndexSet::from([name.clone()]),
                ExtendedType::Interface(_) => schema
                    .types
                    .iter()
                    .filter_map(|(object_name, object_type)| match object_type {
                        ExtendedType::Object(object)
                            if object.implements_interfaces.iter().any(|i| i.name == *name) =>
                        {
                            Some(object_name.clone())
                        }
                        _ => None,
                    })
                    .collect(),
                ExtendedType::Union(union_type) => union_type
                    .members
                    .iter()
                    .map(|member| member.name.clone())
                    .collect(),
                _ => IndexSet::new(),
            };

            types.insert(
                name.clone(),
                TypeDescriptor {
                    name: name.clone(),
                    kind,
                    fields: descriptors,
                    possible_types,
                    type_resolver,
                    serializer,
                    enum_values,
                    input_fields,
                },
            );
        }

        // anything left over was registered against a type or field the schema does not have
        if let Some(((type_name, field), _)) = field_resolvers
            .drain()
            .find(|((type_name, field), _)| {
                types
                    .get(type_name.as_str())
                    .is_none_or(|ty| !ty.fields.contains_key(field.as_str()))
            })
        {
            return Err(if types.contains_key(type_name.as_str()) {
                BuildError::UnknownField { type_name, field }
            } else {
                BuildError::UnknownType(type_name)
            });
        }
        if let Some(name) = type_resolvers
            .into_keys()
            .chain(serializers.into_keys())
            .next()
        {
            return Err(BuildError::UnknownType(name));
        }

        tracing::debug!(types = types.len(), "type map built");
        Ok(Self { schema, types })
    }

    pub(crate) fn schema(&self) -> &Valid<Schema> {
        &self.schema
    }

    pub(crate) fn get(&self, name: &str) -> Option<&TypeDescriptor> {
        self.types.get(name)
    }

    pub(crate) fn field(&self, type_name: &str, field: &str) -> Option<&FieldDescriptor> {
        self.types.get(type_name)?.fields.get(field)
    }

    /// Returns whether a fragment with this type condition applies to values
    /// of the concrete `object_type`.
    pub(crate) fn does_fragment_type_apply(&self, object_type: &str, condition: &str) -> bool {
        object_type == condition
            || self
                .types
                .get(condition)
                .is_some_and(|ty| ty.possible_types.contains(object_type))
    }
}

fn inherited_resolver(
    field_resolvers: &HashMap<(String, String), ResolverBinding>,
    interfaces: &[Name],
    field_name: &Name,
) -> ResolverBinding {
    interfaces
        .iter()
        .find_map(|interface| {
            field_resolvers.get(&(interface.to_string(), field_name.to_string()))
        })
        .cloned()
        .unwrap_or(ResolverBinding::Property)
}

fn input_values(
    schema: &Schema,
    owner: &str,
    definitions: &[apollo_compiler::Node<ast::InputValueDefinition>],
    arguments: bool,
) -> Result<IndexMap<Name, InputValueSpec>, BuildError> {
    definitions
        .iter()
        .map(|definition| {
            let inner = definition.ty.inner_named_type();
            if !schema.types.contains_key(inner) {
                return Err(BuildError::UnknownType(inner.to_string()));
            }
            let default = definition
                .default_value
                .as_ref()
                .map(|value| serialize_constant(value))
                .transpose()
                .map_err(|e| BuildError::InvalidDefault {
                    coordinate: if arguments {
                        format!("{owner}({}:)", definition.name)
                    } else {
                        format!("{owner}.{}", definition.name)
                    },
                    reason: e.to_string(),
                })?;
            Ok((
                definition.name.clone(),
                InputValueSpec {
                    ty: FieldType::from(&*definition.ty),
                    default,
                },
            ))
        })
        .collect()
}

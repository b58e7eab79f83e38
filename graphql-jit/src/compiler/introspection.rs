//! `__schema` and `__type`: answered from the schema the type map was built
//! from, never from user resolvers.
//!
//! Selections on the meta types are collected like any other selection set.
//! When neither a guard nor an argument of the subtree reads a variable, the
//! answer is computed while compiling and embedded in the plan as a constant.

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use apollo_compiler::ast;
use apollo_compiler::ast::OperationType;
use apollo_compiler::schema::DirectiveDefinition;
use apollo_compiler::schema::EnumValueDefinition;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::FieldDefinition;
use apollo_compiler::schema::InputValueDefinition;

use crate::compiler::value::ArgumentsPlan;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::spec::Guard;
use crate::spec::TYPENAME;
use crate::spec::TypeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MetaRoot {
    /// `__schema`
    Schema,
    /// `__type(name:)`
    Type,
}

#[derive(Debug, Default)]
pub(crate) struct MetaSelection {
    pub(crate) fields: Vec<MetaField>,
}

#[derive(Debug)]
pub(crate) struct MetaField {
    pub(crate) response_key: Name,
    pub(crate) name: Name,
    pub(crate) guard: Guard,
    pub(crate) arguments: ArgumentsPlan,
    pub(crate) selection: Option<MetaSelection>,
}

impl MetaSelection {
    /// Whether the selection gives the same answer for any variables.
    pub(crate) fn is_constant(&self) -> bool {
        self.fields.iter().all(|field| {
            field.guard.is_always()
                && field.arguments.is_static()
                && field
                    .selection
                    .as_ref()
                    .is_none_or(MetaSelection::is_constant)
        })
    }
}

/// Answers a `__schema` or `__type` field.
pub(crate) fn evaluate(
    type_map: &TypeMap,
    root: MetaRoot,
    arguments: &Object,
    selection: &MetaSelection,
    variables: &Object,
) -> Value {
    let schema: &Schema = type_map.schema();
    let meta = match root {
        MetaRoot::Schema => Some(Meta::Schema),
        MetaRoot::Type => arguments
            .get("name")
            .and_then(|name| name.as_str())
            .and_then(|name| schema.types.get_key_value(name))
            .map(|(name, _)| Meta::Type(ast::Type::Named(name.clone()))),
    };
    match meta {
        Some(meta) => select(type_map, &meta, selection, variables),
        None => Value::Null,
    }
}

enum Meta<'s> {
    Schema,
    Type(ast::Type),
    Field(&'s FieldDefinition),
    InputValue(&'s InputValueDefinition),
    EnumValue(&'s EnumValueDefinition),
    Directive(&'s DirectiveDefinition),
}

impl Meta<'_> {
    fn type_name(&self) -> &'static str {
        match self {
            Meta::Schema => "__Schema",
            Meta::Type(_) => "__Type",
            Meta::Field(_) => "__Field",
            Meta::InputValue(_) => "__InputValue",
            Meta::EnumValue(_) => "__EnumValue",
            Meta::Directive(_) => "__Directive",
        }
    }
}

enum Resolved<'s> {
    Leaf(Value),
    Object(Meta<'s>),
    List(Vec<Meta<'s>>),
}

impl From<Option<&'_ Node<str>>> for Resolved<'_> {
    fn from(string: Option<&Node<str>>) -> Self {
        Resolved::Leaf(string.map_or(Value::Null, |s| Value::from(&**s)))
    }
}

fn select(
    type_map: &TypeMap,
    meta: &Meta<'_>,
    selection: &MetaSelection,
    variables: &Object,
) -> Value {
    let mut object = Object::new();
    for field in &selection.fields {
        if !field.guard.eval(variables) {
            continue;
        }
        let arguments = field.arguments.resolve(variables);
        let complete = |meta: &Meta<'_>| match &field.selection {
            Some(selection) => select(type_map, meta, selection, variables),
            None => Value::Null,
        };
        let value = match resolve(type_map, meta, &field.name, &arguments) {
            Resolved::Leaf(value) => value,
            Resolved::Object(meta) => complete(&meta),
            Resolved::List(items) => Value::Array(items.iter().map(complete).collect()),
        };
        object.insert(field.response_key.as_str(), value);
    }
    Value::Object(object)
}

fn resolve<'s>(
    type_map: &'s TypeMap,
    meta: &Meta<'s>,
    field: &str,
    arguments: &Object,
) -> Resolved<'s> {
    if field == TYPENAME {
        return Resolved::Leaf(Value::from(meta.type_name()));
    }
    let schema: &'s Schema = type_map.schema();
    let include_deprecated = arguments
        .get("includeDeprecated")
        .and_then(|value| value.as_bool())
        .unwrap_or(false);

    match meta {
        Meta::Schema => match field {
            "description" => schema.schema_definition.description.as_ref().into(),
            "types" => Resolved::List(
                schema
                    .types
                    .keys()
                    .map(|name| Meta::Type(ast::Type::Named(name.clone())))
                    .collect(),
            ),
            "queryType" => root_type(schema, OperationType::Query),
            "mutationType" => root_type(schema, OperationType::Mutation),
            "subscriptionType" => root_type(schema, OperationType::Subscription),
            "directives" => Resolved::List(
                schema
                    .directive_definitions
                    .values()
                    .map(|directive| Meta::Directive(directive))
                    .collect(),
            ),
            _ => Resolved::Leaf(Value::Null),
        },
        Meta::Type(ty) => resolve_type(type_map, ty, field, include_deprecated),
        Meta::Field(definition) => match field {
            "name" => Resolved::Leaf(Value::from(definition.name.as_str())),
            "description" => definition.description.as_ref().into(),
            "args" => {
                input_values(definition.arguments.iter().map(|a| &**a), include_deprecated)
            }
            "type" => Resolved::Object(Meta::Type(definition.ty.clone())),
            "isDeprecated" => is_deprecated(&definition.directives),
            "deprecationReason" => Resolved::Leaf(deprecation_reason(&definition.directives)),
            _ => Resolved::Leaf(Value::Null),
        },
        Meta::InputValue(definition) => match field {
            "name" => Resolved::Leaf(Value::from(definition.name.as_str())),
            "description" => definition.description.as_ref().into(),
            "type" => Resolved::Object(Meta::Type((*definition.ty).clone())),
            "defaultValue" => Resolved::Leaf(
                definition
                    .default_value
                    .as_ref()
                    .map_or(Value::Null, |value| Value::from(value.to_string())),
            ),
            "isDeprecated" => is_deprecated(&definition.directives),
            "deprecationReason" => Resolved::Leaf(deprecation_reason(&definition.directives)),
            _ => Resolved::Leaf(Value::Null),
        },
        Meta::EnumValue(definition) => match field {
            "name" => Resolved::Leaf(Value::from(definition.value.as_str())),
            "description" => definition.description.as_ref().into(),
            "isDeprecated" => is_deprecated(&definition.directives),
            "deprecationReason" => Resolved::Leaf(deprecation_reason(&definition.directives)),
            _ => Resolved::Leaf(Value::Null),
        },
        Meta::Directive(definition) => match field {
            "name" => Resolved::Leaf(Value::from(definition.name.as_str())),
            "description" => definition.description.as_ref().into(),
            "locations" => Resolved::Leaf(Value::Array(
                definition
                    .locations
                    .iter()
                    .map(|location| Value::from(location.name()))
                    .collect(),
            )),
            "args" => {
                input_values(definition.arguments.iter().map(|a| &**a), include_deprecated)
            }
            "isRepeatable" => Resolved::Leaf(Value::Bool(definition.repeatable)),
            _ => Resolved::Leaf(Value::Null),
        },
    }
}

fn resolve_type<'s>(
    type_map: &'s TypeMap,
    ty: &ast::Type,
    field: &str,
    include_deprecated: bool,
) -> Resolved<'s> {
    let name = match ty {
        ast::Type::Named(name) => name,
        ast::Type::NonNullNamed(name) => {
            return match field {
                "kind" => Resolved::Leaf(Value::from("NON_NULL")),
                "ofType" => Resolved::Object(Meta::Type(ast::Type::Named(name.clone()))),
                _ => Resolved::Leaf(Value::Null),
            };
        }
        ast::Type::NonNullList(inner) => {
            return match field {
                "kind" => Resolved::Leaf(Value::from("NON_NULL")),
                "ofType" => Resolved::Object(Meta::Type(ast::Type::List(inner.clone()))),
                _ => Resolved::Leaf(Value::Null),
            };
        }
        ast::Type::List(inner) => {
            return match field {
                "kind" => Resolved::Leaf(Value::from("LIST")),
                "ofType" => Resolved::Object(Meta::Type((**inner).clone())),
                _ => Resolved::Leaf(Value::Null),
            };
        }
    };

    let schema: &'s Schema = type_map.schema();
    let Some(definition) = schema.types.get(name) else {
        return Resolved::Leaf(Value::Null);
    };
    match (field, definition) {
        ("name", _) => Resolved::Leaf(Value::from(name.as_str())),
        ("kind", _) => Resolved::Leaf(Value::from(match definition {
            ExtendedType::Scalar(_) => "SCALAR",
            ExtendedType::Object(_) => "OBJECT",
            ExtendedType::Interface(_) => "INTERFACE",
            ExtendedType::Union(_) => "UNION",
            ExtendedType::Enum(_) => "ENUM",
            ExtendedType::InputObject(_) => "INPUT_OBJECT",
        })),
        ("description", ExtendedType::Scalar(def)) => def.description.as_ref().into(),
        ("description", ExtendedType::Object(def)) => def.description.as_ref().into(),
        ("description", ExtendedType::Interface(def)) => def.description.as_ref().into(),
        ("description", ExtendedType::Union(def)) => def.description.as_ref().into(),
        ("description", ExtendedType::Enum(def)) => def.description.as_ref().into(),
        ("description", ExtendedType::InputObject(def)) => def.description.as_ref().into(),
        ("specifiedByURL", ExtendedType::Scalar(def)) => Resolved::Leaf(
            def.directives
                .get("specifiedBy")
                .and_then(|directive| directive.specified_argument_by_name("url"))
                .and_then(|url| url.as_str())
                .map_or(Value::Null, Value::from),
        ),
        ("fields", ExtendedType::Object(def)) => {
            fields(def.fields.values().map(|f| &*f.node), include_deprecated)
        }
        ("fields", ExtendedType::Interface(def)) => {
            fields(def.fields.values().map(|f| &*f.node), include_deprecated)
        }
        ("interfaces", ExtendedType::Object(def)) => {
            named_types(def.implements_interfaces.iter().map(|i| &i.name))
        }
        ("interfaces", ExtendedType::Interface(def)) => {
            named_types(def.implements_interfaces.iter().map(|i| &i.name))
        }
        ("possibleTypes", ExtendedType::Interface(_) | ExtendedType::Union(_)) => named_types(
            type_map
                .get(name)
                .into_iter()
                .flat_map(|descriptor| descriptor.possible_types.iter()),
        ),
        ("enumValues", ExtendedType::Enum(def)) => Resolved::List(
            def.values
                .values()
                .filter(|value| include_deprecated || deprecated(&value.directives).is_none())
                .map(|value| Meta::EnumValue(&*value.node))
                .collect(),
        ),
        ("inputFields", ExtendedType::InputObject(def)) => {
            input_values(def.fields.values().map(|f| &*f.node), include_deprecated)
        }
        ("isOneOf", ExtendedType::InputObject(def)) => {
            Resolved::Leaf(Value::Bool(def.directives.get("oneOf").is_some()))
        }
        _ => Resolved::Leaf(Value::Null),
    }
}

fn root_type(schema: &Schema, operation_type: OperationType) -> Resolved<'static> {
    match schema.root_operation(operation_type) {
        Some(name) => Resolved::Object(Meta::Type(ast::Type::Named(name.clone()))),
        None => Resolved::Leaf(Value::Null),
    }
}

fn named_types<'a>(names: impl Iterator<Item = &'a Name>) -> Resolved<'static> {
    Resolved::List(
        names
            .map(|name| Meta::Type(ast::Type::Named(name.clone())))
            .collect(),
    )
}

fn fields<'s>(
    definitions: impl Iterator<Item = &'s FieldDefinition>,
    include_deprecated: bool,
) -> Resolved<'s> {
    Resolved::List(
        definitions
            .filter(|field| !field.name.starts_with("__"))
            .filter(|field| include_deprecated || deprecated(&field.directives).is_none())
            .map(Meta::Field)
            .collect(),
    )
}

fn input_values<'s>(
    definitions: impl Iterator<Item = &'s InputValueDefinition>,
    include_deprecated: bool,
) -> Resolved<'s> {
    Resolved::List(
        definitions
            .filter(|value| include_deprecated || deprecated(&value.directives).is_none())
            .map(Meta::InputValue)
            .collect(),
    )
}

fn deprecated(directives: &ast::DirectiveList) -> Option<&Node<ast::Directive>> {
    directives.get("deprecated")
}

fn is_deprecated(directives: &ast::DirectiveList) -> Resolved<'static> {
    Resolved::Leaf(Value::Bool(deprecated(directives).is_some()))
}

fn deprecation_reason(directives: &ast::DirectiveList) -> Value {
    match deprecated(directives) {
        Some(directive) => Value::from(
            directive
                .specified_argument_by_name("reason")
                .and_then(|reason| reason.as_str())
                .unwrap_or("No longer supported"),
        ),
        None => Value::Null,
    }
}

use apollo_compiler::Name;
use apollo_compiler::ast;

use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::spec::TypeKind;
use crate::spec::TypeMap;

/// Marks a position whose value could not be produced. It travels up to the
/// nearest position allowed to hold `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InvalidValue;

// Primitives are taken from scalars: https://spec.graphql.org/draft/#sec-Scalars
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum FieldType {
    /// Named type {0}
    Named(Name),
    /// List type {0}
    List(Box<FieldType>),
    /// Non null type {0}
    NonNull(Box<FieldType>),
    /// String
    String,
    /// Int
    Int,
    /// Float
    Float,
    /// Id
    Id,
    /// Boolean
    Boolean,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Named(ty) => write!(f, "{ty}"),
            FieldType::List(ty) => write!(f, "[{ty}]"),
            FieldType::NonNull(ty) => write!(f, "{ty}!"),
            FieldType::String => write!(f, "String"),
            FieldType::Int => write!(f, "Int"),
            FieldType::Float => write!(f, "Float"),
            FieldType::Id => write!(f, "ID"),
            FieldType::Boolean => write!(f, "Boolean"),
        }
    }
}

impl From<&'_ ast::Type> for FieldType {
    // Spec: https://spec.graphql.org/draft/#sec-Type-References
    fn from(ty: &'_ ast::Type) -> Self {
        let named = |name: &Name| match name.as_str() {
            "String" => Self::String,
            "Int" => Self::Int,
            "Float" => Self::Float,
            "ID" => Self::Id,
            "Boolean" => Self::Boolean,
            _ => Self::Named(name.clone()),
        };
        match ty {
            ast::Type::Named(name) => named(name),
            ast::Type::NonNullNamed(name) => Self::NonNull(Box::new(named(name))),
            ast::Type::List(inner) => Self::List(Box::new((&**inner).into())),
            ast::Type::NonNullList(inner) => {
                Self::NonNull(Box::new(Self::List(Box::new((&**inner).into()))))
            }
        }
    }
}

impl FieldType {
    pub(crate) fn is_non_null(&self) -> bool {
        matches!(self, FieldType::NonNull(_))
    }

    // This function coerces input values according to the graphql specification.
    // Each of the values are validated against the "input coercion" rules.
    pub(crate) fn coerce_input_value(
        &self,
        value: &Value,
        type_map: &TypeMap,
    ) -> Result<Value, InvalidValue> {
        match (self, value) {
            (FieldType::NonNull(inner_ty), value) => {
                if value.is_null() {
                    Err(InvalidValue)
                } else {
                    inner_ty.coerce_input_value(value, type_map)
                }
            }
            // NOTE: graphql's types are all optional by default
            (_, Value::Null) => Ok(Value::Null),
            (FieldType::List(inner_ty), Value::Array(items)) => items
                .iter()
                .map(|item| inner_ty.coerce_input_value(item, type_map))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            // For coercion from single value to list
            (FieldType::List(inner_ty), value) => inner_ty
                .coerce_input_value(value, type_map)
                .map(|item| Value::Array(vec![item])),
            (FieldType::String, Value::String(_)) => Ok(value.clone()),
            (FieldType::Boolean, Value::Bool(_)) => Ok(value.clone()),
            // Spec: https://spec.graphql.org/June2018/#sec-Int
            (FieldType::Int, value) => as_int_input(value).map(Value::from).ok_or(InvalidValue),
            // Spec: https://spec.graphql.org/draft/#sec-Float.Input-Coercion
            (FieldType::Float, value) if value.is_valid_float_input() => Ok(value.clone()),
            // "The ID scalar type represents a unique identifier, often used to refetch an object
            // or as the key for a cache. The ID type is serialized in the same way as a String;
            // however, it is not intended to be human-readable."
            //
            // Integers are accepted and turned into strings
            (FieldType::Id, Value::String(_)) => Ok(value.clone()),
            (FieldType::Id, value) => value
                .as_i64()
                .map(|id| Value::from(id.to_string()))
                .ok_or(InvalidValue),
            (FieldType::Named(name), value) => {
                let descriptor = type_map.get(name).ok_or(InvalidValue)?;
                match descriptor.kind {
                    // we cannot know about the expected format of custom scalars
                    TypeKind::Scalar => Ok(value.clone()),
                    TypeKind::Enum => match value.as_str() {
                        Some(name) if descriptor.enum_values.contains(name) => Ok(value.clone()),
                        _ => Err(InvalidValue),
                    },
                    TypeKind::InputObject => {
                        let object = value.as_object().ok_or(InvalidValue)?;
                        coerce_input_object(object, &descriptor.input_fields, type_map)
                            .map(Value::Object)
                    }
                    TypeKind::Object | TypeKind::Interface | TypeKind::Union => {
                        Err(InvalidValue)
                    }
                }
            }
            _ => Err(InvalidValue),
        }
    }
}

fn as_int_input(value: &Value) -> Option<i64> {
    if value.is_valid_int_input() {
        return value.as_i64();
    }
    // 1.0 is an integer as far as JSON clients are concerned
    let float = value.as_f64()?;
    (float.fract() == 0.0 && float >= i32::MIN as f64 && float <= i32::MAX as f64)
        .then_some(float as i64)
}

fn coerce_input_object(
    object: &Object,
    fields: &indexmap::IndexMap<Name, crate::spec::InputValueSpec>,
    type_map: &TypeMap,
) -> Result<Object, InvalidValue> {
    if object
        .keys()
        .any(|key| !fields.contains_key(key.as_str()))
    {
        return Err(InvalidValue);
    }
    let mut coerced = Object::new();
    for (name, field) in fields {
        match object.get(name.as_str()) {
            Some(value) => {
                coerced.insert(name.as_str(), field.ty.coerce_input_value(value, type_map)?);
            }
            None => match &field.default {
                Some(default) => {
                    coerced.insert(name.as_str(), default.clone());
                }
                None if field.ty.is_non_null() => return Err(InvalidValue),
                None => {}
            },
        }
    }
    Ok(coerced)
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;
    use test_log::test;

    use super::*;
    use crate::spec::Resolvers;

    fn type_map() -> TypeMap {
        TypeMap::parse(
            r#"
            type Query { users(filter: UserFilter): [String] }
            enum Role { ADMIN USER }
            scalar DateTime
            input UserFilter {
              role: Role!
              limit: Int = 10
              since: DateTime
              tags: [String!]
            }
            "#,
            Resolvers::new(),
        )
        .unwrap()
    }

    fn ast_type(source: &str) -> ast::Type {
        if let Some(inner) = source.strip_suffix('!') {
            return match ast_type(inner) {
                ast::Type::Named(name) => ast::Type::NonNullNamed(name),
                ast::Type::List(inner) => ast::Type::NonNullList(inner),
                other => other,
            };
        }
        match source.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            Some(inner) => ast::Type::List(Box::new(ast_type(inner))),
            None => ast::Type::Named(Name::new(source).unwrap()),
        }
    }

    fn ty(source: &str) -> FieldType {
        FieldType::from(&ast_type(source))
    }

    #[test]
    fn display_round_trips_type_syntax() {
        assert_eq!(ty("[Int!]!").to_string(), "[Int!]!");
        assert_eq!(ty("UserFilter").to_string(), "UserFilter");
    }

    #[test]
    fn builtin_scalars() {
        let type_map = type_map();
        assert_eq!(ty("Int").coerce_input_value(&json!(3), &type_map), Ok(json!(3)));
        assert_eq!(ty("Int").coerce_input_value(&json!(3.0), &type_map), Ok(json!(3)));
        assert_eq!(
            ty("Int").coerce_input_value(&json!(3.5), &type_map),
            Err(InvalidValue)
        );
        assert_eq!(
            ty("Int").coerce_input_value(&json!("3"), &type_map),
            Err(InvalidValue)
        );
        assert_eq!(ty("Float").coerce_input_value(&json!(3), &type_map), Ok(json!(3)));
        assert_eq!(ty("ID").coerce_input_value(&json!(12), &type_map), Ok(json!("12")));
        assert_eq!(
            ty("Boolean").coerce_input_value(&json!("true"), &type_map),
            Err(InvalidValue)
        );
        assert_eq!(
            ty("String!").coerce_input_value(&json!(null), &type_map),
            Err(InvalidValue)
        );
        assert_eq!(
            ty("String").coerce_input_value(&json!(null), &type_map),
            Ok(json!(null))
        );
    }

    #[test]
    fn single_values_are_coerced_to_lists() {
        let type_map = type_map();
        assert_eq!(
            ty("[Int]").coerce_input_value(&json!(1), &type_map),
            Ok(json!([1]))
        );
        assert_eq!(
            ty("[Int!]").coerce_input_value(&json!([1, null]), &type_map),
            Err(InvalidValue)
        );
    }

    #[test]
    fn input_objects_get_defaults() {
        let type_map = type_map();
        assert_eq!(
            ty("UserFilter").coerce_input_value(
                &json!({"role": "ADMIN", "since": {"custom": true}, "tags": "a"}),
                &type_map
            ),
            Ok(json!({"role": "ADMIN", "limit": 10, "since": {"custom": true}, "tags": ["a"]}))
        );
        assert_eq!(
            ty("UserFilter").coerce_input_value(&json!({"limit": 1}), &type_map),
            Err(InvalidValue)
        );
        assert_eq!(
            ty("UserFilter").coerce_input_value(&json!({"role": "OWNER"}), &type_map),
            Err(InvalidValue)
        );
        assert_eq!(
            ty("UserFilter").coerce_input_value(&json!({"role": "USER", "extra": 1}), &type_map),
            Err(InvalidValue)
        );
    }
}

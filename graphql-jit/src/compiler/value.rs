use std::borrow::Cow;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::ast;
use indexmap::IndexMap;

use crate::error::CompileError;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::spec::FieldType;
use crate::spec::InputValueSpec;
use crate::spec::TypeKind;
use crate::spec::TypeMap;

/// Converts a literal from the document into the value handed to resolvers.
///
/// Enum values become their name. Variables, Int literals that do not fit in
/// 64 bits and Float literals that are not finite cannot be embedded.
pub fn serialize_constant(value: &ast::Value) -> Result<Value, CompileError> {
    match value {
        ast::Value::Null => Ok(Value::Null),
        ast::Value::Boolean(boolean) => Ok(Value::Bool(*boolean)),
        ast::Value::String(string) => Ok(Value::from(string.as_str())),
        ast::Value::Enum(name) => Ok(Value::from(name.as_str())),
        ast::Value::Int(int) => match int.try_to_i32() {
            Ok(int) => Ok(Value::from(int)),
            Err(_) => int
                .as_str()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| CompileError::UnembeddableConstant(int.as_str().to_string())),
        },
        ast::Value::Float(float) => match float.try_to_f64() {
            Ok(number) if number.is_finite() => Ok(Value::from(number)),
            _ => Err(CompileError::UnembeddableConstant(float.as_str().to_string())),
        },
        ast::Value::Variable(name) => Err(CompileError::UnembeddableConstant(format!(
            "variable ${name} in constant position"
        ))),
        ast::Value::List(items) => items
            .iter()
            .map(|item| serialize_constant(item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        ast::Value::Object(fields) => fields
            .iter()
            .map(|(name, value)| Ok((name.as_str().into(), serialize_constant(value)?)))
            .collect::<Result<Object, CompileError>>()
            .map(Value::Object),
    }
}

/// How one argument (or a part of it) gets its value at invocation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Binding {
    Constant(Value),
    /// Read from the coerced variables. `default` applies when the variable
    /// was not provided.
    Variable { name: Name, default: Option<Value> },
    List(Vec<Binding>),
    Object(Vec<(Name, Binding)>),
}

impl Binding {
    /// `None` means the value is absent: the argument or input field is left out.
    fn resolve(&self, variables: &Object) -> Option<Value> {
        match self {
            Binding::Constant(value) => Some(value.clone()),
            Binding::Variable { name, default } => variables
                .get(name.as_str())
                .cloned()
                .or_else(|| default.clone()),
            Binding::List(items) => Some(Value::Array(
                items
                    .iter()
                    .map(|item| item.resolve(variables).unwrap_or(Value::Null))
                    .collect(),
            )),
            Binding::Object(fields) => Some(Value::Object(
                fields
                    .iter()
                    .filter_map(|(name, field)| {
                        Some((name.as_str().into(), field.resolve(variables)?))
                    })
                    .collect(),
            )),
        }
    }

    #[cfg(test)]
    fn variables<'a>(&'a self, names: &mut Vec<&'a Name>) {
        match self {
            Binding::Constant(_) => {}
            Binding::Variable { name, .. } => names.push(name),
            Binding::List(items) => items.iter().for_each(|item| item.variables(names)),
            Binding::Object(fields) => fields.iter().for_each(|(_, field)| field.variables(names)),
        }
    }

    /// Folds lists and objects made only of constants into one constant.
    fn fold(self) -> Self {
        match self {
            Binding::List(items) if items.iter().all(|i| matches!(i, Binding::Constant(_))) => {
                Binding::Constant(Value::Array(
                    items
                        .into_iter()
                        .filter_map(|item| match item {
                            Binding::Constant(value) => Some(value),
                            _ => None,
                        })
                        .collect(),
                ))
            }
            Binding::Object(fields)
                if fields
                    .iter()
                    .all(|(_, field)| matches!(field, Binding::Constant(_))) =>
            {
                Binding::Constant(Value::Object(
                    fields
                        .into_iter()
                        .filter_map(|(name, field)| match field {
                            Binding::Constant(value) => Some((name.as_str().into(), value)),
                            _ => None,
                        })
                        .collect(),
                ))
            }
            other => other,
        }
    }
}

/// The arguments of a field, prepared once at compile time.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ArgumentsPlan {
    /// No argument depends on a variable: the same object is handed to every call.
    Static(Object),
    Dynamic(Vec<(Name, Binding)>),
}

impl Default for ArgumentsPlan {
    fn default() -> Self {
        ArgumentsPlan::Static(Object::new())
    }
}

impl ArgumentsPlan {
    /// Pairs the arguments written in the document with the declared ones.
    ///
    /// Omitted arguments take their default value, or stay absent. Literals are
    /// coerced the way input literals are: a single value given for a list
    /// becomes a one item list and input objects get their field defaults.
    pub(crate) fn new(
        arguments: &[Node<ast::Argument>],
        declared: &IndexMap<Name, InputValueSpec>,
        type_map: &TypeMap,
    ) -> Result<Self, CompileError> {
        let mut bindings = Vec::with_capacity(declared.len());
        for (name, spec) in declared {
            let binding = match arguments.iter().find(|argument| argument.name == *name) {
                Some(argument) => {
                    literal_binding(&argument.value, &spec.ty, spec.default.as_ref(), type_map)?
                }
                None => match &spec.default {
                    Some(default) => Binding::Constant(default.clone()),
                    None => continue,
                },
            };
            bindings.push((name.clone(), binding));
        }

        if bindings
            .iter()
            .all(|(_, binding)| matches!(binding, Binding::Constant(_)))
        {
            Ok(ArgumentsPlan::Static(
                bindings
                    .into_iter()
                    .filter_map(|(name, binding)| match binding {
                        Binding::Constant(value) => Some((name.as_str().into(), value)),
                        _ => None,
                    })
                    .collect(),
            ))
        } else {
            Ok(ArgumentsPlan::Dynamic(bindings))
        }
    }

    pub(crate) fn is_static(&self) -> bool {
        matches!(self, ArgumentsPlan::Static(_))
    }

    pub(crate) fn resolve<'a>(&'a self, variables: &Object) -> Cow<'a, Object> {
        match self {
            ArgumentsPlan::Static(arguments) => Cow::Borrowed(arguments),
            ArgumentsPlan::Dynamic(bindings) => Cow::Owned(
                bindings
                    .iter()
                    .filter_map(|(name, binding)| {
                        Some((name.as_str().into(), binding.resolve(variables)?))
                    })
                    .collect(),
            ),
        }
    }

    /// Names of the variables read by these arguments.
    #[cfg(test)]
    pub(crate) fn variables(&self) -> Vec<&Name> {
        let mut names = Vec::new();
        if let ArgumentsPlan::Dynamic(bindings) = self {
            for (_, binding) in bindings {
                binding.variables(&mut names);
            }
        }
        names
    }
}

fn literal_binding(
    value: &ast::Value,
    ty: &FieldType,
    default: Option<&Value>,
    type_map: &TypeMap,
) -> Result<Binding, CompileError> {
    let binding = match (value, ty) {
        (ast::Value::Variable(name), _) => Binding::Variable {
            name: name.clone(),
            default: default.cloned(),
        },
        (_, FieldType::NonNull(inner)) => return literal_binding(value, inner, default, type_map),
        (ast::Value::Null, _) => Binding::Constant(Value::Null),
        (ast::Value::List(items), FieldType::List(inner)) => Binding::List(
            items
                .iter()
                .map(|item| literal_binding(item, inner, None, type_map))
                .collect::<Result<_, _>>()?,
        ),
        (_, FieldType::List(inner)) => {
            Binding::List(vec![literal_binding(value, inner, None, type_map)?])
        }
        (ast::Value::Int(int), FieldType::Id) => Binding::Constant(Value::from(int.as_str())),
        (ast::Value::Object(fields), FieldType::Named(name)) => match type_map.get(name) {
            Some(descriptor) if descriptor.kind == TypeKind::InputObject => {
                let mut bindings = Vec::with_capacity(descriptor.input_fields.len());
                for (field_name, field) in &descriptor.input_fields {
                    match fields.iter().find(|(name, _)| name == field_name) {
                        Some((_, value)) => bindings.push((
                            field_name.clone(),
                            literal_binding(value, &field.ty, field.default.as_ref(), type_map)?,
                        )),
                        None => {
                            if let Some(default) = &field.default {
                                bindings
                                    .push((field_name.clone(), Binding::Constant(default.clone())))
                            }
                        }
                    }
                }
                Binding::Object(bindings)
            }
            _ => Binding::Constant(serialize_constant(value)?),
        },
        _ => Binding::Constant(serialize_constant(value)?),
    };
    Ok(binding.fold())
}

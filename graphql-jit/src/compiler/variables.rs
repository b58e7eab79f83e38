use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::ast::VariableDefinition;

use crate::compiler::value::serialize_constant;
use crate::error::CompileError;
use crate::error::ExecutionError;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::spec::FieldType;
use crate::spec::TypeMap;

#[derive(Debug, Clone)]
struct VariableSpec {
    name: Name,
    ty: FieldType,
    default: Option<Value>,
}

/// The variables an operation declares, coerced at every invocation before
/// any resolver runs.
#[derive(Debug, Clone, Default)]
pub(crate) struct Variables {
    specs: Vec<VariableSpec>,
}

impl Variables {
    pub(crate) fn new(definitions: &[Node<VariableDefinition>]) -> Result<Self, CompileError> {
        let specs = definitions
            .iter()
            .map(|definition| {
                Ok(VariableSpec {
                    name: definition.name.clone(),
                    ty: FieldType::from(&*definition.ty),
                    default: definition
                        .default_value
                        .as_ref()
                        .map(|value| serialize_constant(value))
                        .transpose()?,
                })
            })
            .collect::<Result<_, CompileError>>()?;
        Ok(Self { specs })
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|spec| spec.name.as_str())
    }

    /// Coerces the provided values against the declared types.
    ///
    /// Defaults are applied to missing variables, values undeclared by the
    /// operation are dropped. Every invalid variable is reported.
    pub(crate) fn coerce(
        &self,
        provided: &Object,
        type_map: &TypeMap,
    ) -> Result<Object, Vec<ExecutionError>> {
        let mut coerced = Object::new();
        let mut errors = Vec::new();
        for spec in &self.specs {
            match provided.get(spec.name.as_str()) {
                None => match &spec.default {
                    Some(default) => {
                        coerced.insert(spec.name.as_str(), default.clone());
                    }
                    None if spec.ty.is_non_null() => errors.push(ExecutionError::MissingVariable {
                        name: spec.name.to_string(),
                        ty: spec.ty.to_string(),
                    }),
                    None => {}
                },
                Some(Value::Null) if spec.ty.is_non_null() => {
                    errors.push(ExecutionError::NullVariable {
                        name: spec.name.to_string(),
                        ty: spec.ty.to_string(),
                    })
                }
                Some(value) => match spec.ty.coerce_input_value(value, type_map) {
                    Ok(value) => {
                        coerced.insert(spec.name.as_str(), value);
                    }
                    Err(_) => errors.push(ExecutionError::ValidationInvalidTypeVariable {
                        name: spec.name.to_string(),
                    }),
                },
            }
        }

        if errors.is_empty() {
            Ok(coerced)
        } else {
            Err(errors)
        }
    }
}

use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::ast;
use apollo_compiler::executable::SelectionSet;
use apollo_compiler::parser::SourceMap;
use indexmap::IndexMap;

use crate::compiler::collect::CollectedField;
use crate::compiler::collect::collect_fields;
use crate::compiler::identifier::IdentifierNamespace;
use crate::compiler::introspection;
use crate::compiler::introspection::MetaField;
use crate::compiler::introspection::MetaRoot;
use crate::compiler::introspection::MetaSelection;
use crate::compiler::plan::AbstractPlan;
use crate::compiler::plan::Completion;
use crate::compiler::plan::FieldKind;
use crate::compiler::plan::FieldPlan;
use crate::compiler::plan::Leaf;
use crate::compiler::plan::SelectionPlan;
use crate::compiler::schedule;
use crate::compiler::schedule::Level;
use crate::compiler::value::ArgumentsPlan;
use crate::configuration::Configuration;
use crate::error::CompileError;
use crate::graphql::Location;
use crate::json_ext::Object;
use crate::spec::Conjunction;
use crate::spec::FieldType;
use crate::spec::Fragments;
use crate::spec::InputValueSpec;
use crate::spec::SCHEMA_FIELD;
use crate::spec::TYPE_FIELD;
use crate::spec::TYPENAME;
use crate::spec::TypeKind;
use crate::spec::TypeMap;

/// Walks the selections of one operation and builds its plan.
///
/// Lives for a single compilation: the identifier namespace and the plan size
/// counter are never shared.
pub(crate) struct Generator<'a, 'doc> {
    type_map: &'a TypeMap,
    fragments: &'a Fragments<'doc>,
    sources: &'doc SourceMap,
    configuration: &'a Configuration,
    namespace: IdentifierNamespace,
    field_plans: usize,
}

impl<'a, 'doc> Generator<'a, 'doc> {
    pub(crate) fn new(
        type_map: &'a TypeMap,
        fragments: &'a Fragments<'doc>,
        sources: &'doc SourceMap,
        configuration: &'a Configuration,
    ) -> Self {
        Self {
            type_map,
            fragments,
            sources,
            configuration,
            namespace: IdentifierNamespace::new(),
            field_plans: 0,
        }
    }

    /// Number of field plans generated so far.
    pub(crate) fn field_plans(&self) -> usize {
        self.field_plans
    }

    pub(crate) fn root(
        &mut self,
        root_type: &Name,
        selection_set: &'doc SelectionSet,
        serial: bool,
    ) -> Result<SelectionPlan, CompileError> {
        self.selection_plan(
            root_type,
            &[(selection_set, Conjunction::default())],
            "",
            Level {
                depth: 0,
                serial_root: serial,
            },
        )
    }

    fn selection_plan(
        &mut self,
        object_type: &Name,
        selection_sets: &[(&'doc SelectionSet, Conjunction)],
        path: &str,
        level: Level,
    ) -> Result<SelectionPlan, CompileError> {
        if level.depth > self.configuration.limits.max_depth {
            return Err(CompileError::RecursionLimitExceeded);
        }
        let collected = collect_fields(self.type_map, self.fragments, object_type, selection_sets)?;
        let mut fields = Vec::with_capacity(collected.len());
        for (response_key, field) in &collected {
            fields.push(self.field_plan(object_type, response_key, field, path, level.depth)?);
        }
        let schedule = schedule::schedule(&fields, level, &self.configuration.jit);
        Ok(SelectionPlan {
            type_name: object_type.clone(),
            fields,
            schedule,
        })
    }

    fn count_field_plan(&mut self) -> Result<(), CompileError> {
        self.field_plans += 1;
        if self.field_plans > self.configuration.limits.max_plan_nodes {
            return Err(CompileError::PlanTooLarge(
                self.configuration.limits.max_plan_nodes,
            ));
        }
        Ok(())
    }

    fn field_plan(
        &mut self,
        object_type: &Name,
        response_key: &Name,
        collected: &CollectedField<'doc>,
        path: &str,
        depth: usize,
    ) -> Result<FieldPlan, CompileError> {
        self.count_field_plan()?;

        let field = collected.first();
        let path = if path.is_empty() {
            response_key.to_string()
        } else {
            format!("{path}.{response_key}")
        };
        let binding = self.namespace.binding(&path);
        let locations = collected
            .occurrences
            .iter()
            .filter_map(|occurrence| occurrence.field.line_column_range(self.sources))
            .map(|range| Location::from(range.start))
            .collect();

        let kind = match field.name.as_str() {
            TYPENAME => FieldKind::Typename,
            SCHEMA_FIELD => self.introspection(MetaRoot::Schema, collected, depth)?,
            TYPE_FIELD => self.introspection(MetaRoot::Type, collected, depth)?,
            _ => {
                let descriptor = self.type_map.field(object_type, &field.name).ok_or_else(|| {
                    CompileError::UnknownField {
                        type_name: object_type.to_string(),
                        field: field.name.to_string(),
                    }
                })?;
                let arguments =
                    ArgumentsPlan::new(&field.arguments, &descriptor.arguments, self.type_map)?;
                let completion = self.completion(&descriptor.ty, collected, &path, depth + 1)?;
                FieldKind::Resolve {
                    resolver: descriptor.resolver.clone(),
                    arguments,
                    completion,
                }
            }
        };

        Ok(FieldPlan {
            response_key: response_key.clone(),
            field_name: field.name.clone(),
            parent_type: object_type.clone(),
            binding,
            guard: collected.guard(),
            locations,
            kind,
        })
    }

    fn completion(
        &mut self,
        ty: &ast::Type,
        collected: &CollectedField<'doc>,
        path: &str,
        depth: usize,
    ) -> Result<Completion, CompileError> {
        Ok(match ty {
            ast::Type::Named(name) => self.named_completion(name, collected, path, depth)?,
            ast::Type::NonNullNamed(name) => {
                Completion::NonNull(Box::new(self.named_completion(name, collected, path, depth)?))
            }
            ast::Type::List(item) => self.list_completion(item, collected, path, depth)?,
            ast::Type::NonNullList(item) => {
                Completion::NonNull(Box::new(self.list_completion(item, collected, path, depth)?))
            }
        })
    }

    fn list_completion(
        &mut self,
        item: &ast::Type,
        collected: &CollectedField<'doc>,
        path: &str,
        depth: usize,
    ) -> Result<Completion, CompileError> {
        let level = Level {
            depth,
            serial_root: false,
        };
        Ok(Completion::List {
            item: Box::new(self.completion(item, collected, path, depth)?),
            concurrent: schedule::concurrent(level, &self.configuration.jit),
        })
    }

    fn named_completion(
        &mut self,
        name: &Name,
        collected: &CollectedField<'doc>,
        path: &str,
        depth: usize,
    ) -> Result<Completion, CompileError> {
        let descriptor = self
            .type_map
            .get(name)
            .ok_or_else(|| CompileError::UnknownType(name.to_string()))?;
        let level = Level {
            depth,
            serial_root: false,
        };

        let completion = match descriptor.kind {
            TypeKind::Scalar => Completion::Leaf(match name.as_str() {
                "Int" => Leaf::Int,
                "Float" => Leaf::Float,
                "String" => Leaf::String,
                "Boolean" => Leaf::Boolean,
                "ID" => Leaf::Id,
                _ => Leaf::Scalar {
                    name: name.clone(),
                    serializer: descriptor.serializer.clone(),
                },
            }),
            TypeKind::Enum => Completion::Leaf(Leaf::Enum {
                name: name.clone(),
                values: descriptor.enum_values.clone(),
            }),
            TypeKind::Object => Completion::Object(Box::new(self.selection_plan(
                name,
                &collected.sub_selections(),
                path,
                level,
            )?)),
            TypeKind::Interface | TypeKind::Union => {
                let selection_sets = collected.sub_selections();
                let mut possible_types = IndexMap::with_capacity(descriptor.possible_types.len());
                for object_type in &descriptor.possible_types {
                    let plan = self.selection_plan(
                        object_type,
                        &selection_sets,
                        &format!("{path}.{object_type}"),
                        level,
                    )?;
                    possible_types.insert(object_type.clone(), plan);
                }
                Completion::Abstract(Box::new(AbstractPlan {
                    type_name: name.clone(),
                    type_resolver: descriptor.type_resolver.clone(),
                    possible_types,
                }))
            }
            TypeKind::InputObject => {
                return Err(CompileError::Internal {
                    stage: "generating".to_string(),
                    reason: format!("input object type {name} used as an output type"),
                });
            }
        };
        Ok(completion)
    }

    fn introspection(
        &mut self,
        root: MetaRoot,
        collected: &CollectedField<'doc>,
        depth: usize,
    ) -> Result<FieldKind, CompileError> {
        let (meta_type, declared) = match root {
            MetaRoot::Schema => ("__Schema", IndexMap::new()),
            MetaRoot::Type => (
                "__Type",
                IndexMap::from([(
                    apollo_compiler::name!(name),
                    InputValueSpec {
                        ty: FieldType::NonNull(Box::new(FieldType::String)),
                        default: None,
                    },
                )]),
            ),
        };
        let arguments = ArgumentsPlan::new(&collected.first().arguments, &declared, self.type_map)?;
        let selection = self.meta_selection(meta_type, &collected.sub_selections(), depth + 1)?;

        if arguments.is_static() && selection.is_constant() {
            let value = introspection::evaluate(
                self.type_map,
                root,
                &arguments.resolve(&Object::new()),
                &selection,
                &Object::new(),
            );
            return Ok(FieldKind::Constant(value));
        }
        Ok(FieldKind::Introspection {
            root,
            arguments,
            selection: Arc::new(selection),
        })
    }

    fn meta_selection(
        &mut self,
        meta_type: &str,
        selection_sets: &[(&'doc SelectionSet, Conjunction)],
        depth: usize,
    ) -> Result<MetaSelection, CompileError> {
        if depth > self.configuration.limits.max_depth {
            return Err(CompileError::RecursionLimitExceeded);
        }
        let collected = collect_fields(self.type_map, self.fragments, meta_type, selection_sets)?;
        let mut fields = Vec::with_capacity(collected.len());
        for (response_key, field) in &collected {
            self.count_field_plan()?;
            let first = field.first();
            let (arguments, selection) = if first.name == TYPENAME {
                (ArgumentsPlan::default(), None)
            } else {
                let descriptor = self.type_map.field(meta_type, &first.name).ok_or_else(|| {
                    CompileError::UnknownField {
                        type_name: meta_type.to_string(),
                        field: first.name.to_string(),
                    }
                })?;
                let arguments =
                    ArgumentsPlan::new(&first.arguments, &descriptor.arguments, self.type_map)?;
                let inner = descriptor.ty.inner_named_type();
                let selection = match self.type_map.get(inner) {
                    Some(ty) if ty.kind == TypeKind::Object => {
                        Some(self.meta_selection(inner, &field.sub_selections(), depth + 1)?)
                    }
                    _ => None,
                };
                (arguments, selection)
            };
            fields.push(MetaField {
                response_key: response_key.clone(),
                name: first.name.clone(),
                guard: field.guard(),
                arguments,
                selection,
            });
        }
        Ok(MetaSelection { fields })
    }
}

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::executable::Field;
use apollo_compiler::executable::Selection;
use apollo_compiler::executable::SelectionSet;
use indexmap::IndexMap;

use crate::error::CompileError;
use crate::spec::Conjunction;
use crate::spec::Fragments;
use crate::spec::Guard;
use crate::spec::IncludeSkip;
use crate::spec::TypeMap;

/// One place in the document a response key was selected from.
#[derive(Debug, Clone)]
pub(crate) struct Occurrence<'doc> {
    pub(crate) field: &'doc Node<Field>,
    /// Variables that must hold for this occurrence to be kept.
    pub(crate) conjunction: Conjunction,
}

/// A response key of a selection set, with every field merged into it.
#[derive(Debug, Clone)]
pub(crate) struct CollectedField<'doc> {
    pub(crate) occurrences: Vec<Occurrence<'doc>>,
}

impl<'doc> CollectedField<'doc> {
    pub(crate) fn first(&self) -> &'doc Node<Field> {
        self.occurrences[0].field
    }

    pub(crate) fn guard(&self) -> Guard {
        Guard::any_of(self.occurrences.iter().map(|o| &o.conjunction))
    }

    /// The selection sets of every occurrence, to be collected against the
    /// field type.
    ///
    /// A sub-selection is only kept when the occurrence it comes from is kept,
    /// unless every occurrence is kept under the same conditions: the guard of
    /// the field already covers them.
    pub(crate) fn sub_selections(&self) -> Vec<(&'doc SelectionSet, Conjunction)> {
        let shared = self
            .occurrences
            .iter()
            .all(|o| o.conjunction == self.occurrences[0].conjunction);
        self.occurrences
            .iter()
            .map(|occurrence| {
                let conjunction = if shared {
                    Conjunction::default()
                } else {
                    occurrence.conjunction.clone()
                };
                (&occurrence.field.selection_set, conjunction)
            })
            .collect()
    }
}

/// Collects the fields of `selection_sets` that apply to the concrete
/// `object_type`, expanding fragments and merging fields by response key.
///
/// Response keys keep the order of their first selection. Selections skipped
/// by a literal `@skip`/`@include` are dropped here.
pub(crate) fn collect_fields<'doc>(
    type_map: &TypeMap,
    fragments: &Fragments<'doc>,
    object_type: &str,
    selection_sets: &[(&'doc SelectionSet, Conjunction)],
) -> Result<IndexMap<Name, CollectedField<'doc>>, CompileError> {
    let mut fields = IndexMap::new();
    for (selection_set, conjunction) in selection_sets {
        collect_into(
            type_map,
            fragments,
            object_type,
            selection_set,
            conjunction,
            &mut fields,
        )?;
    }
    Ok(fields)
}

fn collect_into<'doc>(
    type_map: &TypeMap,
    fragments: &Fragments<'doc>,
    object_type: &str,
    selection_set: &'doc SelectionSet,
    conjunction: &Conjunction,
    fields: &mut IndexMap<Name, CollectedField<'doc>>,
) -> Result<(), CompileError> {
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(field) => {
                let include_skip = IncludeSkip::parse(&field.directives);
                if include_skip.statically_skipped() {
                    continue;
                }
                fields
                    .entry(field.response_key().clone())
                    .or_insert_with(|| CollectedField {
                        occurrences: Vec::new(),
                    })
                    .occurrences
                    .push(Occurrence {
                        field,
                        conjunction: conjunction.and(&include_skip.conjunction()),
                    });
            }
            Selection::InlineFragment(inline) => {
                let include_skip = IncludeSkip::parse(&inline.directives);
                if include_skip.statically_skipped() {
                    continue;
                }
                if let Some(condition) = &inline.type_condition
                    && !type_map.does_fragment_type_apply(object_type, condition)
                {
                    continue;
                }
                collect_into(
                    type_map,
                    fragments,
                    object_type,
                    &inline.selection_set,
                    &conjunction.and(&include_skip.conjunction()),
                    fields,
                )?;
            }
            Selection::FragmentSpread(spread) => {
                let include_skip = IncludeSkip::parse(&spread.directives);
                if include_skip.statically_skipped() {
                    continue;
                }
                let fragment = fragments.get(&spread.fragment_name).ok_or_else(|| {
                    CompileError::UnknownFragment(spread.fragment_name.to_string())
                })?;
                if !type_map.does_fragment_type_apply(object_type, fragment.type_condition()) {
                    continue;
                }
                collect_into(
                    type_map,
                    fragments,
                    object_type,
                    &fragment.selection_set,
                    &conjunction.and(&include_skip.conjunction()),
                    fields,
                )?;
            }
        }
    }
    Ok(())
}

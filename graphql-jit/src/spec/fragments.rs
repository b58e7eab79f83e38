use std::collections::HashMap;
use std::collections::HashSet;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Node;
use apollo_compiler::executable::Fragment;
use apollo_compiler::executable::Selection;
use apollo_compiler::executable::SelectionSet;

use crate::error::CompileError;

/// Named fragments of a document, checked before any plan is generated.
#[derive(Debug, Default)]
pub(crate) struct Fragments<'doc> {
    map: HashMap<&'doc str, &'doc Node<Fragment>>,
}

impl<'doc> Fragments<'doc> {
    /// Collects the fragment definitions and checks every spread reachable
    /// from `root`: each must name a defined fragment, and no fragment may
    /// spread itself, directly or through other fragments.
    pub(crate) fn new(
        document: &'doc ExecutableDocument,
        root: &'doc SelectionSet,
    ) -> Result<Self, CompileError> {
        let fragments = Self {
            map: document
                .fragments
                .iter()
                .map(|(name, fragment)| (name.as_str(), fragment))
                .collect(),
        };

        let mut stack = Vec::new();
        let mut checked = HashSet::new();
        fragments.check_spreads(root, &mut stack, &mut checked)?;
        Ok(fragments)
    }

    pub(crate) fn get(&self, name: &str) -> Option<&'doc Node<Fragment>> {
        self.map.get(name).copied()
    }

    fn check_spreads(
        &self,
        selection_set: &'doc SelectionSet,
        stack: &mut Vec<&'doc str>,
        checked: &mut HashSet<&'doc str>,
    ) -> Result<(), CompileError> {
        for selection in &selection_set.selections {
            match selection {
                Selection::Field(field) => {
                    self.check_spreads(&field.selection_set, stack, checked)?
                }
                Selection::InlineFragment(inline) => {
                    self.check_spreads(&inline.selection_set, stack, checked)?
                }
                Selection::FragmentSpread(spread) => {
                    let name = spread.fragment_name.as_str();
                    if stack.contains(&name) {
                        return Err(CompileError::CyclicFragment(name.to_string()));
                    }
                    if checked.contains(name) {
                        continue;
                    }
                    let fragment = self
                        .get(name)
                        .ok_or_else(|| CompileError::UnknownFragment(name.to_string()))?;
                    stack.push(name);
                    self.check_spreads(&fragment.selection_set, stack, checked)?;
                    stack.pop();
                    checked.insert(name);
                }
            }
        }
        Ok(())
    }
}

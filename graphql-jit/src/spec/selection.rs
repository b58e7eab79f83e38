use apollo_compiler::Name;
use apollo_compiler::ast;

use crate::json_ext::Object;

/// The `@include`/`@skip` pair found on a field or fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct IncludeSkip {
    include: Condition,
    skip: Condition,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Condition {
    Yes,
    No,
    Variable(Name),
}

impl IncludeSkip {
    pub(crate) fn parse(directives: &ast::DirectiveList) -> Self {
        let mut include = None;
        let mut skip = None;
        for directive in directives.iter() {
            if include.is_none() && directive.name == "include" {
                include = Condition::parse(directive)
            }
            if skip.is_none() && directive.name == "skip" {
                skip = Condition::parse(directive)
            }
        }
        Self {
            include: include.unwrap_or(Condition::Yes),
            skip: skip.unwrap_or(Condition::No),
        }
    }

    pub(crate) fn statically_skipped(&self) -> bool {
        matches!(self.skip, Condition::Yes) || matches!(self.include, Condition::No)
    }

    /// The runtime part of the directives: the variables that decide whether
    /// the selection is kept. Empty when the selection is always kept.
    pub(crate) fn conjunction(&self) -> Conjunction {
        let mut literals = Vec::new();
        if let Condition::Variable(variable) = &self.include {
            literals.push(Literal {
                variable: variable.clone(),
                expected: true,
            });
        }
        if let Condition::Variable(variable) = &self.skip {
            literals.push(Literal {
                variable: variable.clone(),
                expected: false,
            });
        }
        Conjunction(literals)
    }
}

impl Condition {
    pub(crate) fn parse(directive: &ast::Directive) -> Option<Self> {
        match &**directive.specified_argument_by_name("if")? {
            ast::Value::Boolean(true) => Some(Condition::Yes),
            ast::Value::Boolean(false) => Some(Condition::No),
            ast::Value::Variable(variable) => Some(Condition::Variable(variable.clone())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Literal {
    variable: Name,
    expected: bool,
}

impl Literal {
    fn eval(&self, variables: &Object) -> bool {
        // Using `true` for a missing value is legit here because variables
        // are coerced before execution: `if` arguments are `Boolean!`
        variables
            .get(self.variable.as_str())
            .and_then(|v| v.as_bool())
            .is_none_or(|value| value == self.expected)
    }
}

/// Variable conditions that must all hold for a selection to be kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub(crate) struct Conjunction(Vec<Literal>);

impl Conjunction {
    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn and(&self, other: &Conjunction) -> Conjunction {
        let mut literals = self.0.clone();
        for literal in &other.0 {
            if !literals.contains(literal) {
                literals.push(literal.clone());
            }
        }
        Conjunction(literals)
    }

    pub(crate) fn eval(&self, variables: &Object) -> bool {
        self.0.iter().all(|literal| literal.eval(variables))
    }
}

/// Decides at runtime whether a merged field is part of the response: it is
/// when any of the places it was selected from is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Guard {
    Always,
    AnyOf(Vec<Conjunction>),
}

impl Guard {
    pub(crate) fn any_of<'a>(conjunctions: impl IntoIterator<Item = &'a Conjunction>) -> Self {
        let mut alternatives: Vec<Conjunction> = Vec::new();
        for conjunction in conjunctions {
            if conjunction.is_empty() {
                return Guard::Always;
            }
            if !alternatives.contains(conjunction) {
                alternatives.push(conjunction.clone());
            }
        }
        Guard::AnyOf(alternatives)
    }

    pub(crate) fn is_always(&self) -> bool {
        matches!(self, Guard::Always)
    }

    pub(crate) fn eval(&self, variables: &Object) -> bool {
        match self {
            Guard::Always => true,
            Guard::AnyOf(alternatives) => alternatives.iter().any(|c| c.eval(variables)),
        }
    }
}

#[cfg(test)]
mod tests {
    use apollo_compiler::ExecutableDocument;
    use apollo_compiler::Schema;
    use apollo_compiler::executable::Selection;
    use serde_json_bytes::json;
    use test_log::test;

    use super::*;

    fn first_field_directives(query: &str) -> ast::DirectiveList {
        let schema =
            Schema::parse_and_validate("type Query { a: Int b: Int }", "schema.graphql").unwrap();
        let document = ExecutableDocument::parse(&schema, query, "query.graphql").unwrap();
        let operation = document.operations.iter().next().unwrap();
        match &operation.selection_set.selections[0] {
            Selection::Field(field) => field.directives.clone(),
            _ => panic!("expected a field"),
        }
    }

    fn variables(value: serde_json_bytes::Value) -> Object {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn literals_are_resolved_statically() {
        assert!(IncludeSkip::parse(&first_field_directives("{ a @skip(if: true) }"))
            .statically_skipped());
        assert!(IncludeSkip::parse(&first_field_directives("{ a @include(if: false) }"))
            .statically_skipped());
        let kept = IncludeSkip::parse(&first_field_directives(
            "{ a @include(if: true) @skip(if: false) }",
        ));
        assert!(!kept.statically_skipped());
        assert!(kept.conjunction().is_empty());
    }

    #[test]
    fn variables_are_read_at_runtime() {
        let conjunction = IncludeSkip::parse(&first_field_directives(
            "query($b: Boolean!, $c: Boolean!) { a @skip(if: $b) @include(if: $c) }",
        ))
        .conjunction();
        assert!(conjunction.eval(&variables(json!({"b": false, "c": true}))));
        assert!(!conjunction.eval(&variables(json!({"b": true, "c": true}))));
        assert!(!conjunction.eval(&variables(json!({"b": false, "c": false}))));
    }

    #[test]
    fn guards_keep_a_field_when_any_occurrence_is_kept() {
        let skip_b = IncludeSkip::parse(&first_field_directives(
            "query($b: Boolean!) { a @skip(if: $b) }",
        ))
        .conjunction();
        let include_c = IncludeSkip::parse(&first_field_directives(
            "query($c: Boolean!) { a @include(if: $c) }",
        ))
        .conjunction();

        let guard = Guard::any_of([&skip_b, &include_c]);
        assert!(guard.eval(&variables(json!({"b": true, "c": true}))));
        assert!(guard.eval(&variables(json!({"b": false, "c": false}))));
        assert!(!guard.eval(&variables(json!({"b": true, "c": false}))));

        assert!(Guard::any_of([&skip_b, &Conjunction::default()]).is_always());
        assert_eq!(skip_b.and(&skip_b), skip_b);
    }
}

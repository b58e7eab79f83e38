use std::fmt;
use std::fmt::Write;
use std::sync::Arc;

use apollo_compiler::Name;
use indexmap::IndexMap;
use indexmap::IndexSet;

use crate::compiler::introspection::MetaRoot;
use crate::compiler::introspection::MetaSelection;
use crate::compiler::value::ArgumentsPlan;
use crate::graphql::Location;
use crate::json_ext::Value;
use crate::spec::Guard;
use crate::spec::ResolverBinding;
use crate::spec::SerializerFn;
use crate::spec::TypeResolverFn;

/// How the fields of one selection set are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Schedule {
    /// Nothing below awaits: the object is produced without suspending.
    Sync,
    /// Synchronous fields run in query order, awaiting fields are all started
    /// and then awaited together.
    Concurrent,
    /// Every field completes before the next one starts.
    Serial,
}

/// The fields selected on one concrete object type.
pub(crate) struct SelectionPlan {
    pub(crate) type_name: Name,
    pub(crate) fields: Vec<FieldPlan>,
    pub(crate) schedule: Schedule,
}

impl SelectionPlan {
    pub(crate) fn awaits(&self) -> bool {
        self.schedule != Schedule::Sync
    }
}

pub(crate) struct FieldPlan {
    pub(crate) response_key: Name,
    pub(crate) field_name: Name,
    pub(crate) parent_type: Name,
    /// Unique name of this position in the plan.
    pub(crate) binding: String,
    pub(crate) guard: Guard,
    pub(crate) locations: Vec<Location>,
    pub(crate) kind: FieldKind,
}

impl FieldPlan {
    pub(crate) fn awaits(&self) -> bool {
        match &self.kind {
            FieldKind::Resolve {
                resolver,
                completion,
                ..
            } => resolver.is_async() || completion.awaits(),
            _ => false,
        }
    }

    /// Whether a failure of this field nulls its parent object.
    pub(crate) fn is_non_null(&self) -> bool {
        match &self.kind {
            FieldKind::Resolve { completion, .. } => completion.is_non_null(),
            FieldKind::Typename => true,
            FieldKind::Constant(_) | FieldKind::Introspection { .. } => false,
        }
    }
}

pub(crate) enum FieldKind {
    /// `__typename`: the name of the parent object type.
    Typename,
    /// A value computed while compiling.
    Constant(Value),
    /// `__schema` or `__type` depending on variables.
    Introspection {
        root: MetaRoot,
        arguments: ArgumentsPlan,
        selection: Arc<MetaSelection>,
    },
    Resolve {
        resolver: ResolverBinding,
        arguments: ArgumentsPlan,
        completion: Completion,
    },
}

/// How a resolved value is shaped according to the field type.
pub(crate) enum Completion {
    NonNull(Box<Completion>),
    List {
        item: Box<Completion>,
        /// Items whose completion awaits are started together.
        concurrent: bool,
    },
    Leaf(Leaf),
    Object(Box<SelectionPlan>),
    Abstract(Box<AbstractPlan>),
}

impl Completion {
    pub(crate) fn awaits(&self) -> bool {
        match self {
            Completion::NonNull(inner) => inner.awaits(),
            Completion::List { item, .. } => item.awaits(),
            Completion::Leaf(_) => false,
            Completion::Object(plan) => plan.awaits(),
            Completion::Abstract(plan) => plan.possible_types.values().any(|p| p.awaits()),
        }
    }

    pub(crate) fn is_non_null(&self) -> bool {
        matches!(self, Completion::NonNull(_))
    }
}

/// Dispatch on the runtime type of an interface or union value.
pub(crate) struct AbstractPlan {
    pub(crate) type_name: Name,
    pub(crate) type_resolver: Option<Arc<TypeResolverFn>>,
    /// One plan per possible object type, with the selections applying to it.
    pub(crate) possible_types: IndexMap<Name, SelectionPlan>,
}

pub(crate) enum Leaf {
    Int,
    Float,
    String,
    Boolean,
    Id,
    Enum {
        name: Name,
        values: IndexSet<Name>,
    },
    Scalar {
        name: Name,
        serializer: Option<Arc<SerializerFn>>,
    },
}

impl fmt::Display for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leaf::Int => f.write_str("Int"),
            Leaf::Float => f.write_str("Float"),
            Leaf::String => f.write_str("String"),
            Leaf::Boolean => f.write_str("Boolean"),
            Leaf::Id => f.write_str("ID"),
            Leaf::Enum { name, .. } | Leaf::Scalar { name, .. } => f.write_str(name),
        }
    }
}

/// Renders a plan as an indented tree, one line per field.
pub(crate) fn explain(plan: &SelectionPlan) -> String {
    let mut out = String::new();
    write_selection(&mut out, plan, 0);
    out
}

fn write_selection(out: &mut String, plan: &SelectionPlan, indent: usize) {
    let _ = writeln!(
        out,
        "{:indent$}{} ({})",
        "",
        plan.type_name,
        match plan.schedule {
            Schedule::Sync => "sync",
            Schedule::Concurrent => "concurrent",
            Schedule::Serial => "serial",
        },
        indent = indent * 2
    );
    for field in &plan.fields {
        let guarded = if field.guard.is_always() { "" } else { " @if" };
        let kind = match &field.kind {
            FieldKind::Typename => "typename",
            FieldKind::Constant(_) => "constant",
            FieldKind::Introspection { .. } => "introspection",
            FieldKind::Resolve { resolver, .. } => match resolver {
                ResolverBinding::Property => "property",
                ResolverBinding::Sync(_) => "sync",
                ResolverBinding::Async(_) => "async",
            },
        };
        let _ = writeln!(
            out,
            "{:indent$}{}: {} [{}] {kind}{guarded}",
            "",
            field.response_key,
            field.field_name,
            field.binding,
            indent = (indent + 1) * 2
        );
        if let FieldKind::Resolve { completion, .. } = &field.kind {
            write_completion(out, completion, indent + 2);
        }
    }
}

fn write_completion(out: &mut String, completion: &Completion, indent: usize) {
    match completion {
        Completion::NonNull(inner) | Completion::List { item: inner, .. } => {
            write_completion(out, inner, indent)
        }
        Completion::Leaf(_) => {}
        Completion::Object(plan) => write_selection(out, plan, indent),
        Completion::Abstract(plan) => {
            for possible in plan.possible_types.values() {
                write_selection(out, possible, indent)
            }
        }
    }
}

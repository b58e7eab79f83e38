use std::collections::HashMap;
use std::collections::HashSet;

use heck::ToSnakeCase;

const RESERVED: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum", "extern",
    "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub",
    "ref", "return", "self", "static", "struct", "super", "trait", "true", "type", "unsafe",
    "use", "where", "while",
];

/// Turns a query name (field, alias, type) into a snake_case binding name.
///
/// Characters outside `[a-z0-9_]` become `_`, a leading digit is prefixed
/// with `_`, and reserved words get a trailing `_`.
pub(crate) fn sanitize(name: &str) -> String {
    let mut identifier: String = name
        .to_snake_case()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if identifier.is_empty() {
        identifier.push('_');
    }
    if identifier.starts_with(|c: char| c.is_ascii_digit()) {
        identifier.insert(0, '_');
    }
    if RESERVED.contains(&identifier.as_str()) {
        identifier.push('_');
    }
    identifier
}

/// Hands out one binding name per query position for the duration of a
/// compilation.
///
/// Positions are identified by their path of response keys, so aliases of a
/// same field get distinct bindings, and two paths that sanitize to the same
/// name are told apart with a numeric suffix.
#[derive(Debug, Default)]
pub(crate) struct IdentifierNamespace {
    by_path: HashMap<String, String>,
    taken: HashSet<String>,
}

impl IdentifierNamespace {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the binding for a `.`-separated path. Asking twice for the same
    /// path returns the same binding.
    pub(crate) fn binding(&mut self, path: &str) -> String {
        if let Some(binding) = self.by_path.get(path) {
            return binding.clone();
        }

        let base = path
            .split('.')
            .filter(|segment| !segment.is_empty())
            .map(sanitize)
            .collect::<Vec<_>>()
            .join("_");
        let base = if base.is_empty() { sanitize("") } else { base };

        let mut binding = base.clone();
        let mut suffix = 0;
        while self.taken.contains(&binding) {
            suffix += 1;
            binding = format!("{base}_{suffix}");
        }

        self.taken.insert(binding.clone());
        self.by_path.insert(path.to_string(), binding.clone());
        binding
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.by_path.len()
    }
}

//! Performance oriented JSON manipulation.

#![allow(missing_docs)]

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map;
pub use serde_json_bytes::Value;

/// A JSON object.
pub type Object = Map<ByteString, Value>;

/// Compares two values and panics with both of them printed if they differ,
/// including differences in object key order.
#[cfg(test)]
macro_rules! assert_eq_and_ordered {
    ($a:expr, $b:expr $(,)?) => {
        let a = $a;
        let b = $b;
        assert!(
            $crate::json_ext::ValueExt::eq_and_ordered(&a, &b),
            "assertion failed: objects are not equal or not ordered the same way:\n{}\n{}",
            serde_json::to_string_pretty(&a).unwrap_or_default(),
            serde_json::to_string_pretty(&b).unwrap_or_default(),
        );
    };
}

/// Extension trait for [`serde_json::Value`].
pub(crate) trait ValueExt {
    /// Returns `true` if the values are equal and the objects are ordered the same.
    ///
    /// **Note:** this is recursive.
    #[cfg(test)]
    fn eq_and_ordered(&self, other: &Self) -> bool;

    /// Returns `true` if the value can be coerced to an Int input value.
    fn is_valid_int_input(&self) -> bool;

    /// Returns `true` if the value can be coerced to a Float input value.
    fn is_valid_float_input(&self) -> bool;

    /// Returns the `__typename` field of an object, if it is a string.
    fn typename(&self) -> Option<&str>;
}

impl ValueExt for Value {
    #[cfg(test)]
    fn eq_and_ordered(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => {
                let mut it_a = a.iter();
                let mut it_b = b.iter();

                loop {
                    match (it_a.next(), it_b.next()) {
                        (Some(_), None) | (None, Some(_)) => break false,
                        (None, None) => break true,
                        (Some((field_a, value_a)), Some((field_b, value_b)))
                            if field_a == field_b && ValueExt::eq_and_ordered(value_a, value_b) =>
                        {
                            continue;
                        }
                        (Some(_), Some(_)) => break false,
                    }
                }
            }
            (Value::Array(a), Value::Array(b)) => {
                let mut it_a = a.iter();
                let mut it_b = b.iter();

                loop {
                    match (it_a.next(), it_b.next()) {
                        (Some(_), None) | (None, Some(_)) => break false,
                        (None, None) => break true,
                        (Some(value_a), Some(value_b))
                            if ValueExt::eq_and_ordered(value_a, value_b) =>
                        {
                            continue;
                        }
                        (Some(_), Some(_)) => break false,
                    }
                }
            }
            (a, b) => a == b,
        }
    }

    fn is_valid_int_input(&self) -> bool {
        // Input coercion rules for Int: integral numbers within the 32 bit range
        self.as_i64().is_some_and(|x| i32::try_from(x).is_ok())
    }

    fn is_valid_float_input(&self) -> bool {
        // Integers are accepted and coerced to floats
        self.as_f64().is_some_and(f64::is_finite)
    }

    fn typename(&self) -> Option<&str> {
        self.as_object()
            .and_then(|o| o.get("__typename"))
            .and_then(|v| v.as_str())
    }
}

/// Renders a value the way it is quoted in error messages.
pub(crate) fn inspect(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| String::from("<unprintable>"))
}

/// A GraphQL path element that is composed of strings or numbers.
/// e.g `/book/3/name`
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathElement {
    /// An index path element.
    Index(usize),

    /// A key path element.
    Key(String),
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElement::Index(index) => write!(f, "{index}"),
            PathElement::Key(key) => f.write_str(key),
        }
    }
}

/// A path into the result document.
///
/// This can be composed of strings and numbers
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Path(pub Vec<PathElement>);

impl Path {
    pub fn empty() -> Path {
        Path(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathElement> {
        self.0.iter()
    }

    pub fn push(&mut self, element: PathElement) {
        self.0.push(element)
    }

    pub fn last(&self) -> Option<&PathElement> {
        self.0.last()
    }
}

impl<T> From<T> for Path
where
    T: AsRef<str>,
{
    /// Parses a `/`-separated path, numeric segments becoming indexes.
    fn from(s: T) -> Self {
        Self(
            s.as_ref()
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(|segment| match segment.parse::<usize>() {
                    Ok(index) => PathElement::Index(index),
                    Err(_) => PathElement::Key(segment.to_string()),
                })
                .collect(),
        )
    }
}

impl FromIterator<PathElement> for Path {
    fn from_iter<T: IntoIterator<Item = PathElement>>(iter: T) -> Self {
        Path(iter.into_iter().collect())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in self.iter() {
            write!(f, "/{element}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;
    use test_log::test;

    use super::*;

    #[test]
    fn eq_and_ordered_detects_key_order() {
        let a = json!({"b": 1, "a": {"x": [1, 2]}});
        let b = json!({"a": {"x": [1, 2]}, "b": 1});
        assert_eq!(a, b);
        assert!(!a.eq_and_ordered(&b));
        assert!(a.eq_and_ordered(&a.clone()));
    }

    #[test]
    fn path_from_string() {
        let path = Path::from("/users/3/name");
        assert_eq!(
            path,
            Path(vec![
                PathElement::Key("users".to_string()),
                PathElement::Index(3),
                PathElement::Key("name".to_string()),
            ])
        );
        assert_eq!(path.to_string(), "/users/3/name");
    }

    #[test]
    fn path_serializes_as_array() {
        let path = Path::from("user/0/name");
        assert_eq!(
            serde_json::to_value(&path).unwrap(),
            serde_json::json!(["user", 0, "name"])
        );
    }

    #[test]
    fn int_and_float_input() {
        assert!(json!(42).is_valid_int_input());
        assert!(!json!(2147483648i64).is_valid_int_input());
        assert!(!json!(1.5).is_valid_int_input());
        assert!(json!(1).is_valid_float_input());
        assert!(json!(1.5).is_valid_float_input());
        assert!(!json!("1.5").is_valid_float_input());
    }

    #[test]
    fn typename_lookup() {
        let value = json!({"__typename": "Book", "title": "Dune"});
        assert_eq!(value.typename(), Some("Book"));
        assert_eq!(json!("Book").typename(), None);
    }
}

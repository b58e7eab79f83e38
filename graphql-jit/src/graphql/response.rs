use serde::Deserialize;
use serde::Serialize;

use crate::graphql::Error;
use crate::json_ext::Value;

/// A GraphQL response: `{ data, errors }`.
///
/// `data` is absent when the request failed before execution started (for
/// example invalid variables), and `null` when a non-null root field failed.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Response {
    /// The response data.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,

    /// The optional graphql errors encountered.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<Error>,
}

#[buildstructor::buildstructor]
impl Response {
    /// Constructor
    #[builder(visibility = "pub")]
    fn new(data: Option<Value>, errors: Vec<Error>) -> Self {
        Self { data, errors }
    }

    /// A response for a request that failed before any field was resolved.
    pub(crate) fn from_errors(errors: Vec<Error>) -> Self {
        Self { data: None, errors }
    }

    /// append_errors default the errors `path` with the one provided.
    pub fn append_errors(&mut self, errors: &mut Vec<Error>) {
        self.errors.append(errors)
    }
}

//! Form fields submitted with a directory operation.

use super::operation::OperationError;

/// Read-only view of the fields of one request, in submission order.
///
/// A name may appear several times; query-string fields come before body
/// fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationRequest {
    fields: Vec<(String, String)>,
}

impl OperationRequest {
    #[must_use]
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }

    /// Appends fields after the existing ones.
    pub fn extend(&mut self, fields: impl IntoIterator<Item = (String, String)>) {
        self.fields.extend(fields);
    }

    /// Every value of `name`, in submission order.
    pub fn values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        let name = name.to_string();
        self.fields
            .iter()
            .filter(move |(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns the only value of `name`.
    ///
    /// # Errors
    ///
    /// Returns `MissingField` when the field is absent or repeated.
    pub fn single(&self, name: &str) -> Result<&str, OperationError> {
        let mut values = self.values(name);
        match (values.next(), values.next()) {
            (Some(value), None) => Ok(value),
            (None, _) => Err(OperationError::missing_field(name, "required")),
            (Some(_), Some(_)) => Err(OperationError::missing_field(
                name,
                format!("expected exactly one value, got {}", self.values(name).count()),
            )),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, String)> for OperationRequest {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

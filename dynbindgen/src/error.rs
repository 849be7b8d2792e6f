//! Errors reported while turning declarations into bindings.

use itertools::Itertools;

/// A problem with a single declaration.
///
/// Every variant names the declaration it was found in so that a list of errors
/// can be traced back to the header.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A type name matches no primitive, struct, enum, or typedef
    #[error("{decl}: unknown type `{ty}`")]
    UnknownType { decl: String, ty: String },
    /// The emitted record and its aggregate descriptor disagree on field count
    #[error("{decl}: record has {fields} fields but its ffi descriptor has {elements} elements")]
    AmbiguousStructLayout {
        decl: String,
        fields: usize,
        elements: usize,
    },
    /// Two declarations or enum members produce the same emitted identifier
    #[error("{decl}: `{name}` is emitted more than once")]
    DuplicateName { decl: String, name: String },
    /// Variadic functions, bitfields, multi-dimensional arrays and the like
    #[error("{decl}: unsupported construct: {construct}")]
    UnsupportedConstruct { decl: String, construct: String },
    /// Emitted tokens of an artifact failed to parse as a Rust file
    #[error("{unit}: generated code does not parse: {message}")]
    InvalidOutput { unit: String, message: String },
}

impl Error {
    pub(crate) fn unknown_type(decl: &str, ty: impl ToString) -> Self {
        Error::UnknownType {
            decl: decl.to_string(),
            ty: ty.to_string(),
        }
    }

    pub(crate) fn duplicate(decl: &str, name: impl Into<String>) -> Self {
        Error::DuplicateName {
            decl: decl.to_string(),
            name: name.into(),
        }
    }

    pub(crate) fn unsupported(decl: &str, construct: impl Into<String>) -> Self {
        Error::UnsupportedConstruct {
            decl: decl.to_string(),
            construct: construct.into(),
        }
    }

    /// Name of the declaration the error was found in
    pub fn declaration(&self) -> &str {
        match self {
            Error::UnknownType { decl, .. }
            | Error::AmbiguousStructLayout { decl, .. }
            | Error::DuplicateName { decl, .. }
            | Error::UnsupportedConstruct { decl, .. } => decl,
            Error::InvalidOutput { unit, .. } => unit,
        }
    }
}

/// Errors accumulated over a whole declaration model.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorList(pub Vec<Error>);

impl ErrorList {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Error> {
        self.0.iter()
    }
}

impl std::fmt::Display for ErrorList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.iter().join("\n"))
    }
}

impl std::error::Error for ErrorList {}

impl From<Vec<Error>> for ErrorList {
    fn from(errors: Vec<Error>) -> Self {
        Self(errors)
    }
}

impl Extend<Error> for ErrorList {
    fn extend<T: IntoIterator<Item = Error>>(&mut self, iter: T) {
        self.0.extend(iter)
    }
}

impl IntoIterator for ErrorList {
    type Item = Error;
    type IntoIter = std::vec::IntoIter<Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_list_display() {
        let errors = ErrorList(vec![
            Error::unknown_type("calc_add", "quux"),
            Error::unsupported("printf", "variadic function"),
        ]);
        assert_eq!(
            errors.to_string(),
            "calc_add: unknown type `quux`\nprintf: unsupported construct: variadic function"
        );
        assert_eq!(errors.iter().next().unwrap().declaration(), "calc_add");
    }
}

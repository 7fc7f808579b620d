use thiserror::Error;

/// An observation was recorded for a variant the table was not built with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown benchmark variant '{0}'")]
pub struct UnknownVariant(pub String);

impl UnknownVariant {
    pub fn variant(&self) -> &str {
        &self.0
    }
}

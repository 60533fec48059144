use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantField {
    Kind,
    Schema,
    Table,
    View,
}

impl std::fmt::Display for GrantField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GrantField::Kind => write!(f, "kind"),
            GrantField::Schema => write!(f, "schema"),
            GrantField::Table => write!(f, "table"),
            GrantField::View => write!(f, "view"),
        }
    }
}

/// Reasons a grant is refused on the role write path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrantValidationError {
    #[error("a grant cannot set both table '{table}' and view '{view}'")]
    TableAndView { table: String, view: String },
    #[error("{field} '{name}' requires a schema")]
    ObjectWithoutSchema { field: GrantField, name: String },
    #[error("{field} must not be empty")]
    EmptyName { field: GrantField },
    #[error("role already holds an identical grant")]
    Duplicate,
}

impl GrantValidationError {
    /// Form field the error should be attached to.
    pub fn field(&self) -> GrantField {
        match self {
            GrantValidationError::TableAndView { .. } => GrantField::View,
            GrantValidationError::ObjectWithoutSchema { .. } => GrantField::Schema,
            GrantValidationError::EmptyName { field } => *field,
            GrantValidationError::Duplicate => GrantField::Kind,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            GrantValidationError::TableAndView { .. } => "table_and_view",
            GrantValidationError::ObjectWithoutSchema { .. } => "object_without_schema",
            GrantValidationError::EmptyName { .. } => "empty_name",
            GrantValidationError::Duplicate => "duplicate_grant",
        }
    }
}

/// One error attached to one form field, e.g. `grants[2].view`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn from_grant(prefix: &str, err: &GrantValidationError) -> Self {
        Self::new(
            format!("{prefix}.{}", err.field()),
            err.code(),
            err.to_string(),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, err: FieldError) {
        self.0.push(err);
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|e| e.field.as_str())
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.0.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for err in &self.0 {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", err.field, err.message)?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthzErrorCode {
    Io,
    Encode,
    Decode,
    InvalidGrant,
    InvalidTarget,
    Validation,
    InvalidConfig,
    Unavailable,
}

impl AuthzErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthzErrorCode::Io => "io",
            AuthzErrorCode::Encode => "encode",
            AuthzErrorCode::Decode => "decode",
            AuthzErrorCode::InvalidGrant => "invalid_grant",
            AuthzErrorCode::InvalidTarget => "invalid_target",
            AuthzErrorCode::Validation => "validation",
            AuthzErrorCode::InvalidConfig => "invalid_config",
            AuthzErrorCode::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid grant: {0}")]
    InvalidGrant(#[from] GrantValidationError),
    #[error("invalid target: {message}")]
    InvalidTarget { message: String },
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    #[error("principal source unavailable: {message}")]
    Unavailable { message: String },
}

impl From<ValidationErrors> for AuthzError {
    fn from(errors: ValidationErrors) -> Self {
        AuthzError::Validation(errors)
    }
}

impl AuthzError {
    pub fn code(&self) -> AuthzErrorCode {
        match self {
            AuthzError::Io(_) => AuthzErrorCode::Io,
            AuthzError::Encode(_) => AuthzErrorCode::Encode,
            AuthzError::Decode(_) => AuthzErrorCode::Decode,
            AuthzError::InvalidGrant(_) => AuthzErrorCode::InvalidGrant,
            AuthzError::InvalidTarget { .. } => AuthzErrorCode::InvalidTarget,
            AuthzError::Validation(_) => AuthzErrorCode::Validation,
            AuthzError::InvalidConfig { .. } => AuthzErrorCode::InvalidConfig,
            AuthzError::Unavailable { .. } => AuthzErrorCode::Unavailable,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthzError, AuthzErrorCode, FieldError, GrantField, GrantValidationError};

    #[test]
    fn error_code_strings_are_stable() {
        assert_eq!(AuthzErrorCode::InvalidGrant.as_str(), "invalid_grant");
        assert_eq!(AuthzErrorCode::InvalidConfig.as_str(), "invalid_config");
        assert_eq!(AuthzErrorCode::Unavailable.as_str(), "unavailable");
    }

    #[test]
    fn grant_errors_convert_and_keep_their_code() {
        let err: AuthzError = GrantValidationError::Duplicate.into();
        assert_eq!(err.code(), AuthzErrorCode::InvalidGrant);
        assert_eq!(err.code_str(), "invalid_grant");
    }

    #[test]
    fn grant_errors_map_to_form_fields() {
        let err = GrantValidationError::ObjectWithoutSchema {
            field: GrantField::Table,
            name: "orders".into(),
        };
        assert_eq!(err.field(), GrantField::Schema);
        let field_err = FieldError::from_grant("grants[3]", &err);
        assert_eq!(field_err.field, "grants[3].schema");
        assert_eq!(field_err.code, "object_without_schema");
        assert_eq!(field_err.message, "table 'orders' requires a schema");
    }
}

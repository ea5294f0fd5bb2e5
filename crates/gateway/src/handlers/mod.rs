//! API handlers module

pub mod documents;
pub mod explain;
pub mod health;

use ruleforge_common::errors::AppError;
use validator::ValidationErrors;

/// Map `validator` failures onto the shared 400 response
pub(crate) fn validation_error(errors: ValidationErrors) -> AppError {
    let field = errors.field_errors().keys().next().map(|field| field.to_string());
    AppError::Validation {
        message: errors.to_string(),
        field,
    }
}

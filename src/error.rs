use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("schema not registered: {0}")]
    UnknownSchema(String),

    #[error("field '{field}' is not declared in schema '{schema}'")]
    MissingField { schema: String, field: String },

    #[error("field '{field}' in schema '{schema}' has no reference")]
    MissingReference { schema: String, field: String },

    #[error("field '{field}' in schema '{schema}' references unregistered model '{model}'")]
    UnresolvedReference {
        schema: String,
        field: String,
        model: String,
    },

    #[error("malformed spec: {0}")]
    MalformedSpec(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("invalid schema definition: {0}")]
    InvalidSchema(String),

    #[error("spec nesting exceeds maximum depth of {0}")]
    DepthExceeded(usize),
}

pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, OdmError>;

#[derive(Debug, Error)]
pub enum OdmError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Logging error: {0}")]
    Logging(String),

    #[error("Model not defined: {0}")]
    UnknownModel(String),

    #[error("Model already defined: {0}")]
    ModelAlreadyDefined(String),

    #[error("Unsupported query shape: {0}")]
    UnsupportedQueryShape(String),

    #[error("Invalid includes on {model}: {message}")]
    InvalidIncludes { model: String, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid option {option}: {message}")]
    InvalidOption { option: &'static str, message: String },

    #[error("Projection conflict: {0}")]
    ProjectionConflict(String),

    #[error("Scope not defined on {model}: {name}")]
    UnknownScope { model: String, name: String },

    #[error("Extension not available on this criteria: {0}")]
    UnknownExtension(String),

    #[error("Map/reduce needs an output directive; call out() before execution")]
    NoMapReduceOutput,

    #[error("Document(s) not found for class {model} with id(s) {}", format_ids(.ids))]
    DocumentNotFound { model: String, ids: Vec<String> },

    #[error("Document(s) not found for class {model} with attributes {conditions}")]
    DocumentNotFoundBy { model: String, conditions: String },

    #[error("Missing attribute '{field}' on {model}: the field was excluded by the query projection")]
    MissingAttribute { model: String, field: String },

    #[error("Illegal key: {0}")]
    IllegalKey(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

fn format_ids(ids: &[String]) -> String {
    ids.join(", ")
}

impl From<std::io::Error> for OdmError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required parameter: {0}")]
    MissingParam(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("API error: {message}")]
    Api { message: String },
}

impl EngineError {
    /// Builds an API error from a non-2xx response body.
    ///
    /// The backend convention is `{ "message": string }`; anything else
    /// (non-JSON, missing key) falls back to a generic message carrying the
    /// status code.
    pub fn from_response(status: u16, bytes: &[u8]) -> Self {
        let message = serde_json::from_slice::<serde_json::Value>(bytes)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
            .unwrap_or_else(|| format!("Request failed with status {status}"));
        EngineError::Api { message }
    }

    /// The user-facing message for this error, per the surface-verbatim rule.
    pub fn user_message(&self) -> String {
        match self {
            EngineError::Api { message } => message.clone(),
            EngineError::MissingParam(p) => format!("Missing required parameter: {p}"),
            _ => "Something went wrong while contacting the booking service".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

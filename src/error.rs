//! Error types for the ingestion endpoint.

/// Configuration-related errors. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors raised while decoding an envelope's payload.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Invalid base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// The failure value that crosses the entry-point boundary.
///
/// The hosting runtime can be failed with anything, so the error channel is
/// a sum over two shapes: a structured failure carrying a message and a
/// rendered trace, and an opaque value with no structure at all. Logging
/// branches on the variant; propagation hands the caller the same value
/// that was raised (the type is `Clone + PartialEq` so callers can assert
/// identity by equality).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FunctionError {
    #[error("{message}")]
    Structured {
        message: String,
        trace: Option<String>,
    },

    #[error("{0}")]
    Opaque(String),
}

impl FunctionError {
    /// Wrap a real error value, capturing its message and source chain.
    pub fn structured(err: &(dyn std::error::Error + 'static)) -> Self {
        Self::Structured {
            message: err.to_string(),
            trace: Some(render_trace(err)),
        }
    }

    /// Wrap a failure value that carries no structure.
    pub fn opaque(value: impl Into<String>) -> Self {
        Self::Opaque(value.into())
    }

    /// The message text (structured) or string form (opaque) of the failure.
    pub fn description(&self) -> &str {
        match self {
            Self::Structured { message, .. } => message,
            Self::Opaque(value) => value,
        }
    }

    /// The rendered trace, present only for structured failures.
    pub fn trace(&self) -> Option<&str> {
        match self {
            Self::Structured { trace, .. } => trace.as_deref(),
            Self::Opaque(_) => None,
        }
    }
}

impl From<ConfigError> for FunctionError {
    fn from(err: ConfigError) -> Self {
        Self::structured(&err)
    }
}

impl From<DispatchError> for FunctionError {
    fn from(err: DispatchError) -> Self {
        Self::structured(&err)
    }
}

/// Render an error and its source chain into a trace string.
fn render_trace(err: &(dyn std::error::Error + 'static)) -> String {
    let mut trace = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        trace.push_str("\n    caused by: ");
        trace.push_str(&cause.to_string());
        source = cause.source();
    }
    trace
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    #[test]
    fn structured_failure_carries_trace() {
        let err = FunctionError::from(ConfigError::MissingEnvVar("FOO".to_string()));
        assert_eq!(
            err.description(),
            "Missing required environment variable: FOO"
        );
        assert!(err.trace().is_some());
    }

    #[test]
    fn opaque_failure_has_no_trace() {
        let err = FunctionError::opaque("just a string");
        assert_eq!(err.description(), "just a string");
        assert_eq!(err.trace(), None);
    }

    #[test]
    fn trace_includes_source_chain() {
        let decode_err = base64::engine::general_purpose::STANDARD
            .decode("!!!")
            .unwrap_err();
        let err = FunctionError::from(DispatchError::Decode(decode_err));
        let trace = err.trace().unwrap();
        assert!(trace.starts_with("Invalid base64 payload: "));
        assert!(trace.contains("caused by: "));
    }

    #[test]
    fn identity_is_equality_comparable() {
        let a = FunctionError::opaque("boom");
        let b = a.clone();
        assert_eq!(a, b);
    }
}

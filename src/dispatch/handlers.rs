//! Handling strategies and the registry that routes to them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::envelope::Payload;
use crate::error::FunctionError;

/// Routing attribute reserved for classification.
pub const TYPE_ATTRIBUTE: &str = "type";

/// Routing attribute reserved for the default handler's priority check.
pub const PRIORITY_ATTRIBUTE: &str = "priority";

/// A payload-specific handling strategy.
///
/// Payload shape is producer-controlled and unvalidated, so implementations
/// must treat unexpected shapes as "no match" and return `Ok` rather than
/// fail.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// The routing tag this handler answers to.
    fn name(&self) -> &str;

    /// Process a classified payload.
    async fn handle(
        &self,
        payload: &Payload,
        attributes: &HashMap<String, String>,
    ) -> Result<(), FunctionError>;
}

/// Maps the envelope's `type` attribute to a handler, with a mandatory
/// default entry for unclassifiable messages.
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
    default: Arc<dyn MessageHandler>,
}

impl HandlerRegistry {
    /// Create a registry with only the given default handler.
    pub fn new(default: Arc<dyn MessageHandler>) -> Self {
        Self {
            handlers: HashMap::new(),
            default,
        }
    }

    /// The built-in strategy set: greeting, notification, default fallback.
    pub fn builtin() -> Self {
        let mut registry = Self::new(Arc::new(DefaultHandler));
        registry.register(Arc::new(GreetingHandler));
        registry.register(Arc::new(NotificationHandler));
        registry
    }

    /// Register a handler under its own routing tag.
    pub fn register(&mut self, handler: Arc<dyn MessageHandler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    /// Resolve a routing tag to a handler. Unknown or absent tags resolve
    /// to the default entry.
    pub fn resolve(&self, tag: Option<&str>) -> &Arc<dyn MessageHandler> {
        tag.and_then(|t| self.handlers.get(t))
            .unwrap_or(&self.default)
    }

    /// Registered routing tags (the default entry is not listed).
    pub fn tags(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}

/// Acknowledges payloads that greet us.
pub struct GreetingHandler;

/// The acknowledgement line for a greeting payload, if it matches.
///
/// A text payload matches when it contains a case-insensitive "hello";
/// a JSON string payload is treated the same way. Any other structured
/// payload matches on its `message` field, and the optional `name` field
/// personalizes the acknowledgement.
pub fn greeting_ack(payload: &Payload) -> Option<String> {
    match payload {
        Payload::Text(text) | Payload::Structured(serde_json::Value::String(text))
            if text.to_lowercase().contains("hello") =>
        {
            Some("Hello! Greeting received and acknowledged.".to_string())
        }
        Payload::Structured(value) => {
            let message = value.get("message")?.as_str()?;
            if !message.to_lowercase().contains("hello") {
                return None;
            }
            let name = value
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("there");
            Some(format!("Hello {name}! Greeting received."))
        }
        _ => None,
    }
}

#[async_trait]
impl MessageHandler for GreetingHandler {
    fn name(&self) -> &str {
        "greeting"
    }

    async fn handle(
        &self,
        payload: &Payload,
        _attributes: &HashMap<String, String>,
    ) -> Result<(), FunctionError> {
        info!("Processing greeting message");
        if let Some(ack) = greeting_ack(payload) {
            info!("{ack}");
        }
        Ok(())
    }
}

/// Placeholder strategy — extension point for alerting side effects.
pub struct NotificationHandler;

#[async_trait]
impl MessageHandler for NotificationHandler {
    fn name(&self) -> &str {
        "notification"
    }

    async fn handle(
        &self,
        _payload: &Payload,
        _attributes: &HashMap<String, String>,
    ) -> Result<(), FunctionError> {
        info!("Processing notification message");
        Ok(())
    }
}

/// Fallback strategy for unclassifiable messages.
pub struct DefaultHandler;

#[async_trait]
impl MessageHandler for DefaultHandler {
    fn name(&self) -> &str {
        "default"
    }

    async fn handle(
        &self,
        _payload: &Payload,
        attributes: &HashMap<String, String>,
    ) -> Result<(), FunctionError> {
        info!("Processing default message");
        if attributes.get(PRIORITY_ATTRIBUTE).map(String::as_str) == Some("high") {
            warn!("High priority message received!");
        }
        Ok(())
    }
}

//! Dispatch service — decodes an envelope and routes it to a strategy.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::dispatch::handlers::{HandlerRegistry, TYPE_ATTRIBUTE};
use crate::envelope::{CloudEventMessage, Payload};
use crate::error::FunctionError;

/// Routes validated envelopes to the matching handling strategy.
///
/// Classification looks only at the envelope's attribute map, never at the
/// payload shape. Decoding is pure; the only failure surfaces here are
/// malformed base64 (fatal) and a failing strategy.
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    /// Process a single envelope.
    ///
    /// Failures are logged once at this layer (with the trace for
    /// structured failures) and propagate unchanged to the entry point.
    pub async fn handle_message(&self, envelope: &CloudEventMessage) -> Result<(), FunctionError> {
        match self.process(envelope).await {
            Ok(()) => {
                info!(message_id = %envelope.message_id, "Message processed successfully");
                Ok(())
            }
            Err(err) => {
                match err.trace() {
                    Some(trace) => error!(
                        trace = %trace,
                        "Failed to handle message: {}",
                        err.description()
                    ),
                    None => error!("Failed to handle message: {}", err.description()),
                }
                Err(err)
            }
        }
    }

    async fn process(&self, envelope: &CloudEventMessage) -> Result<(), FunctionError> {
        info!(
            message_id = %envelope.message_id,
            publish_time = %envelope.publish_time,
            "Processing CloudEvent message"
        );
        if let Some(attrs) = &envelope.attributes {
            info!(attributes = ?attrs, "Message attributes");
        }

        // Absent payload is a supported case, not an error.
        if envelope.data.is_none() {
            warn!(message_id = %envelope.message_id, "Received message with no data");
            return Ok(());
        }

        let payload = envelope.decode_payload().map_err(FunctionError::from)?;
        if let Payload::Text(_) = payload {
            debug!("Data is plain text (not JSON)");
        }

        let attributes: HashMap<String, String> =
            envelope.attributes.clone().unwrap_or_default();
        let handler = self.registry.resolve(envelope.attribute(TYPE_ATTRIBUTE));
        debug!(handler = handler.name(), "Routing message");
        handler.handle(&payload, &attributes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::handlers::MessageHandler;
    use async_trait::async_trait;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
    use std::sync::Mutex;

    /// Records which handler ran, for routing assertions.
    struct RecordingHandler {
        tag: &'static str,
        seen: Arc<Mutex<Vec<String>>>,
        fail_with: Option<FunctionError>,
    }

    #[async_trait]
    impl MessageHandler for RecordingHandler {
        fn name(&self) -> &str {
            self.tag
        }

        async fn handle(
            &self,
            _payload: &Payload,
            _attributes: &HashMap<String, String>,
        ) -> Result<(), FunctionError> {
            self.seen.lock().unwrap().push(self.tag.to_string());
            match &self.fail_with {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }
    }

    fn recording_dispatcher(seen: Arc<Mutex<Vec<String>>>) -> Dispatcher {
        let mut registry = HandlerRegistry::new(Arc::new(RecordingHandler {
            tag: "default",
            seen: Arc::clone(&seen),
            fail_with: None,
        }));
        for tag in ["greeting", "notification"] {
            registry.register(Arc::new(RecordingHandler {
                tag,
                seen: Arc::clone(&seen),
                fail_with: None,
            }));
        }
        Dispatcher::new(Arc::new(registry))
    }

    fn envelope(data: Option<&str>, message_type: Option<&str>) -> CloudEventMessage {
        CloudEventMessage {
            message_id: "m1".to_string(),
            publish_time: "2023-01-01T00:00:00Z".to_string(),
            data: data.map(|d| BASE64_STANDARD.encode(d)),
            attributes: message_type.map(|t| {
                [("type".to_string(), t.to_string())].into()
            }),
        }
    }

    #[tokio::test]
    async fn no_data_resolves_without_invoking_handlers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = recording_dispatcher(Arc::clone(&seen));

        let result = dispatcher
            .handle_message(&envelope(None, Some("greeting")))
            .await;
        assert!(result.is_ok());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_base64_is_a_structured_failure() {
        let dispatcher = recording_dispatcher(Arc::new(Mutex::new(Vec::new())));
        let mut msg = envelope(None, None);
        msg.data = Some("%%% not base64 %%%".to_string());

        let err = dispatcher.handle_message(&msg).await.unwrap_err();
        assert!(err.description().starts_with("Invalid base64 payload"));
        assert!(err.trace().is_some());
    }

    #[tokio::test]
    async fn routes_on_the_type_attribute() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = recording_dispatcher(Arc::clone(&seen));

        for (tag, expected) in [
            (Some("greeting"), "greeting"),
            (Some("notification"), "notification"),
            (Some("something-else"), "default"),
            (None, "default"),
        ] {
            dispatcher
                .handle_message(&envelope(Some("hello"), tag))
                .await
                .unwrap();
            assert_eq!(seen.lock().unwrap().pop().as_deref(), Some(expected));
        }
    }

    #[tokio::test]
    async fn handler_failure_propagates_unchanged() {
        let boom = FunctionError::opaque("boom");
        let mut registry = HandlerRegistry::new(Arc::new(RecordingHandler {
            tag: "default",
            seen: Arc::new(Mutex::new(Vec::new())),
            fail_with: Some(boom.clone()),
        }));
        registry.register(Arc::new(RecordingHandler {
            tag: "greeting",
            seen: Arc::new(Mutex::new(Vec::new())),
            fail_with: None,
        }));
        let dispatcher = Dispatcher::new(Arc::new(registry));

        let err = dispatcher
            .handle_message(&envelope(Some("anything"), None))
            .await
            .unwrap_err();
        assert_eq!(err, boom);
    }
}

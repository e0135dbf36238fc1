//! Entry point invoked by the hosting runtime once per delivered message.

use std::future::Future;
use std::sync::Arc;

use tracing::{error, info};

use crate::context::{AppContext, ContextCache, global_cache};
use crate::envelope::CloudEventMessage;
use crate::error::FunctionError;

/// Handle one delivered message using the process-wide context.
///
/// Resolving acknowledges the message; the returned error (propagated
/// unchanged) signals the runtime to apply its own redelivery policy.
pub async fn handle_event(envelope: CloudEventMessage) -> Result<(), FunctionError> {
    handle_event_with(global_cache(), crate::context::init_from_env, envelope).await
}

/// Handle one delivered message against an explicit cache and initializer.
///
/// Every failure (context acquisition or dispatch) is intercepted exactly
/// once here: logged as `Error processing PubSub message: <description>`,
/// with a trace field only when the failure is structured, then propagated
/// with its identity intact.
pub async fn handle_event_with<F, Fut>(
    cache: &ContextCache,
    init: F,
    envelope: CloudEventMessage,
) -> Result<(), FunctionError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Arc<AppContext>, FunctionError>> + Send + 'static,
{
    let result = process(cache, init, &envelope).await;
    if let Err(err) = &result {
        match err.trace() {
            Some(trace) => error!(
                trace = %trace,
                "Error processing PubSub message: {}",
                err.description()
            ),
            None => error!("Error processing PubSub message: {}", err.description()),
        }
    }
    result
}

async fn process<F, Fut>(
    cache: &ContextCache,
    init: F,
    envelope: &CloudEventMessage,
) -> Result<(), FunctionError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Arc<AppContext>, FunctionError>> + Send + 'static,
{
    let context = cache.acquire(init).await?;

    // Diagnostic record of the raw envelope; truncation/redaction is the
    // logging transport's concern.
    let raw = serde_json::to_string_pretty(envelope).unwrap_or_else(|_| format!("{envelope:?}"));
    info!("RAW EVENT ↓\n{raw}");

    context.dispatcher.handle_message(envelope).await
}

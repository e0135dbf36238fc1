//! Payload dispatch: decode, classify by attribute, route to a strategy.

pub mod handlers;
pub mod service;

pub use handlers::{HandlerRegistry, MessageHandler};
pub use service::Dispatcher;

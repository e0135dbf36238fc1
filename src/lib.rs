//! Pub/Sub CloudEvent ingestion endpoint — decode, classify, dispatch.

pub mod config;
pub mod context;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod function;

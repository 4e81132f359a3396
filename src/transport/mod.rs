//! Transport module - platform-specific pipe/socket handling.
//!
//! Provides abstraction over:
//! - Unix Domain Sockets (Linux/macOS)
//! - Named Pipes (Windows)
//!
//! The platform family decides the variant once, at compile time; client
//! and server sides always agree because both derive the concrete resource
//! from the same [`EndpointName`](crate::endpoint::EndpointName).

mod ipc;

pub use ipc::{ServerListener, ServerStream};

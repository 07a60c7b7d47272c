//! Integration tests for the workflow runtime.
//!
//! Schemes are served from memory by `JsonSchemeLoader` and state is kept
//! in an `InMemoryStore`, so every test runs a complete runtime without
//! external services.

mod lifecycle;
mod services;
mod suspension;
mod support;

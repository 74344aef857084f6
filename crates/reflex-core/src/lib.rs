//! Core value sources for the reflex automation engine
//!
//! This crate provides the observation primitives that trigger watchers
//! subscribe to:
//!
//! - [`ObservableValue`] - a mutable value that broadcasts every change as an
//!   old/new pair
//! - [`EventSource`] - a fire-and-forget event channel carrying a payload
//!
//! Both are backed by [`tokio::sync::broadcast`], so any number of watchers
//! can subscribe and a `set`/`emit` never blocks on slow consumers.

mod source;

pub use source::{Change, EventSource, ObservableValue};

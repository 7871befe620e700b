//! Per-room synchronization runtime for the chatter client.
//!
//! Wires the [`client_core`] store, state machine, and retry policy to the
//! collaborator seams (API, push transport, authentication) and exposes the
//! [`ChatClient`] facade consumed by frontends.

/// Public client facade and runtime configuration.
mod client;
/// Per-room synchronization controller task.
mod controller;
/// Backlog fetch and merge.
mod history;
/// Shared per-room handle (store, observation channels, close guard).
mod room;
/// Optimistic send coordination.
mod send;
/// Wall-clock helper.
mod time;
/// Collaborator traits and live feed subscription types.
pub mod traits;

pub use client::{ChatClient, SyncConfig};
pub use traits::{AuthProvider, ChatApi, FeedEvent, FeedSubscription, LiveFeed, SessionHandle};

//! # apiforge-server
//!
//! HTTP daemon library for apiforge.
//!
//! Holds the shared state (search service, usage analyzer, sync
//! coordinator, descriptor store) and the axum handlers that expose it.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;

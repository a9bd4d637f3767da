//! # beacon-server
//!
//! HTTP host for beacon-presence.
//!
//! This library provides the API handlers, the trigger event log and the
//! state shared between the handlers and the presence monitor.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod events;
pub mod logging;
pub mod state;

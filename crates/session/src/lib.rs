//! Browser session management for browser-backed vendors.
//!
//! One session exists per process: a browser handle, one context, one page.
//! The manager is a two-state machine (Closed/Open) with a reentrant
//! `acquire`, a script-execution bridge with console capture, and an
//! idempotent `release`. All access is serialized through one async mutex:
//! one page, one writer at a time; concurrent navigation or evaluation on a
//! shared page corrupts vendor-side cart state.

mod manager;
pub mod page;
mod scripts;

pub use manager::{SessionConfig, SessionManager, DEFAULT_USER_AGENT};

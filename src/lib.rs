//! Interview copilot: live answer suggestions during an interview.
//!
//! A spoken answer is captured, sent with the candidate's job context to an
//! answer endpoint, improved by a generative model and shown back; every
//! exchange is saved to a shared history. A second device can start and stop
//! capture remotely and receive the resulting answer.
//!
//! # Architecture
//!
//! - **Capture** ([`capture`]): single-session speech capture over a
//!   pluggable recognizer, transcript built by a pure fold
//! - **Controller** ([`controller`]): single-flight answer requests with
//!   cooperative cancellation and streamed rendering
//! - **Resolver** ([`resolver`]): ordered upstream model fallback
//! - **History** ([`history`]): append-only exchange store with an
//!   unindexed fallback for listings
//! - **Remote** ([`remote`]): last-write-wins command and answer mailboxes
//! - **Server** ([`server`]): axum host for the answer endpoint, history and
//!   session mailboxes

pub mod api;
pub mod capture;
pub mod config;
pub mod controller;
pub mod error;
pub mod history;
pub mod logging;
pub mod paths;
pub mod preferences;
pub mod remote;
pub mod resolver;
pub mod server;

pub use config::CopilotConfig;
pub use error::{CopilotError, Result};
pub use server::{AppServer, ServerServices};

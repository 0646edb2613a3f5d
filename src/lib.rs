//! Palabre is a terminal chat client for AI platform gateways that broker
//! access to multiple hosted model providers behind one credential.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns conversation state, provider family routing, response
//!   normalization, and turn orchestration (streaming, simulated streaming,
//!   and the blocking fallback).
//! - [`platform`] defines the gateway capability traits and the HTTP client
//!   that implements them.
//! - [`auth`] stores the gateway credential and tracks the session's
//!   authentication lifecycle.
//! - [`commands`] implements slash-command parsing used by the chat loop.
//! - [`ui`] runs the interactive line-oriented chat loop.
//! - [`api`] defines the wire payloads exchanged with the gateway.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`], which dispatches into [`ui::chat_loop`] for
//! interactive sessions.

pub mod api;
pub mod auth;
pub mod cli;
pub mod commands;
pub mod core;
pub mod platform;
pub mod ui;
pub mod utils;

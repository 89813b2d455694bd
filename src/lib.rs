// ABOUTME: Crate root for the chatbox conversation backend
// ABOUTME: Re-exports the pieces integration tests and the binary wire together
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Chatbox Server
//!
//! Backend for a conversational AI chat application: authenticated
//! clients exchange messages with an upstream Gemini-style service,
//! and every conversation is persisted with optional encryption at
//! rest.
//!
//! Main pieces:
//! - [`auth`] / [`middleware`] — JWT issuance, validation, and the
//!   per-request auth gate
//! - [`database`] — SQLite-backed conversation and user stores
//! - [`context`] — bounded context assembly for upstream requests
//! - [`llm`] — the Gemini gateway and its retry machinery
//! - [`analytics`] — aggregate usage numbers
//! - [`routes`] / [`server`] — the HTTP surface

pub mod analytics;
pub mod auth;
pub mod config;
pub mod context;
pub mod crypto;
pub mod database;
pub mod errors;
pub mod logging;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub mod llm;

pub use errors::{AppError, AppResult, ErrorCode};
pub use server::{router, serve, ServerResources};

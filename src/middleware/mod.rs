// ABOUTME: HTTP middleware layers applied to the router
// ABOUTME: Currently the per-request authentication gate
//
// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod auth;

pub use auth::{authenticate, require_auth, AuthContext};

// ABOUTME: Core types for the lyric chat persistence workspace
// ABOUTME: Foundation crate with error handling and cursor pagination
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![deny(unsafe_code)]

//! # Lyric Core
//!
//! Foundation crate providing shared types for the chat persistence workspace.
//! It is designed to change infrequently, enabling incremental compilation
//! benefits in the workspace.
//!
//! ## Modules
//!
//! - **errors**: Unified error handling with `AppError`, `ErrorCode` and `StoreError`
//! - **pagination**: Cursor-based pagination for conversation listings

/// Unified error handling system with standard error codes
pub mod errors;

/// Cursor-based pagination for efficient data traversal
pub mod pagination;

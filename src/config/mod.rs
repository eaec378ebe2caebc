// ABOUTME: Configuration management module for the chat persistence services
// ABOUTME: Store location, rate limiting and transaction retry settings from the environment
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

/// Store location configuration
pub mod database;
/// Environment and service configuration
pub mod environment;

pub use database::{DatabaseConfig, DatabaseUrl};
pub use environment::{RateLimitConfig, ServerConfig};

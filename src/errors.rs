// ABOUTME: Re-exports the unified error system from lyric-core
// ABOUTME: Keeps AppError, ErrorCode and StoreError the same types across the workspace
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

pub use lyric_core::errors::*;

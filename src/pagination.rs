// ABOUTME: Re-exports pagination types from lyric-core for unified type identity
// ABOUTME: Ensures PaginationParams/CursorPage are the same type across all workspace crates
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

pub use lyric_core::pagination::*;

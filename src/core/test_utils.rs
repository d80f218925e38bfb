//! Test utilities for arena-based testing.
//!
//! Each test owns its arena through a [`test::TestContext`], the same way a
//! compilation owns the arena behind its lowering context.

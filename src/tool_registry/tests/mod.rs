//! Unit tests for tool registry supervision and refresh.

mod refresh_tests;

// Shared fixtures for integration and contract tests
//
// Every test builds its own in-memory store and scripted gateway, so tests
// never share state and need no database or network. `test_database` is the
// exception: it backs the same services with MySQL.
//
// Usage:
//   #[path = "../helpers/mod.rs"]
//   mod helpers;
//   use helpers::*;

#![allow(dead_code)]

pub mod fixtures;

pub use fake_gateway::*;
pub use fixtures::*;
pub use test_database::*;

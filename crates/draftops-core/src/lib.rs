// Library root: re-exports all modules so integration tests and the monitor
// binary can access the crate's public API.

pub mod config;
pub mod db;
pub mod draft;
pub mod players;
pub mod processor;
pub mod protocol;
pub mod reconcile;
pub mod resolver;
pub mod validator;

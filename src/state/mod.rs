/// State management module
///
/// This module handles all application state, including:
/// - The durable asset store (store.rs)
/// - Shared data structures (data.rs)
/// - View handles for in-memory payloads (handles.rs)
/// - The in-memory working set shown in the grid (library.rs)
/// - Persisted classifier and viewer defaults (config.rs)

pub mod config;
pub mod data;
pub mod handles;
pub mod library;
pub mod store;

//! Social-media API client built around an optimistic query cache.
//!
//! Reads go through [`cache::QueryCache`]; mutations go through
//! [`sync::Synchronizer`], which writes the predicted value first and
//! reconciles with the server afterwards.

pub mod api;
pub mod cache;
pub mod commands;
pub mod config;
pub mod event;
pub mod logging;
pub mod shell;
pub mod social;
pub mod sync;

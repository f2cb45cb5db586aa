//! Client for the remote social API.

mod api_types;
mod client;
mod error;
#[cfg(test)]
pub mod fake;
pub mod types;

pub use client::{ApiClient, SocialApi};
pub use error::ApiError;
pub use types::*;

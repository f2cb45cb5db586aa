//! Social resources on top of the cache: keys, cached reads and actions.

mod actions;
mod client;
pub mod keys;
mod session;

pub use actions::{Actions, Submitted};
pub use client::SocialClient;
pub use session::Credentials;

//! OAuth2 user credential acquisition and caching
//!
//! The [`Authorizer`] hands out a token from memory, from the cache file, or
//! by running the browser consent flow against a loopback callback listener.

mod browser;
pub mod callback;
mod flow;
pub mod store;

pub use browser::{SystemBrowser, UrlOpener};
pub use flow::{AuthState, Authorizer, FlowSettings};
pub use store::{ClientIdentity, Token, load_cached_token, load_identity, save_token};

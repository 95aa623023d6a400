//! Authentication module for the user pool and identity pool
//!
//! This module provides:
//! - Identity token decoding and validation
//! - AuthenticationGateway for password sign-in, refresh and code exchange
//! - IdentityExchange for federated identity ids and credentials
//! - Session, which refreshes its token and storage client on demand
//! - RedirectHandler for completing browser sign-in

mod token;
mod gateway;
mod exchange;
mod session;
mod redirect;
mod service;

pub use token::{decode, decode_base64url, Claims, IdentityToken};
pub use gateway::AuthenticationGateway;
pub use exchange::{FederatedCredentials, IdentityExchange};
pub use session::{Session, SessionStatus};
pub use redirect::RedirectHandler;
pub use service::AuthService;

#[cfg(test)]
pub(crate) use token::testing;

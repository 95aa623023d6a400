//! Amber - user pool sign-in with federated access to per-user storage
//!
//! This library provides identity-token handling, the sign-in grants, the
//! federated credential exchange and a text content library on top of an
//! S3-compatible object store.

pub mod auth;
pub mod aws;
pub mod config;
pub mod content;
pub mod error;
pub mod storage;
pub mod ui;

pub use error::{Error, Result};

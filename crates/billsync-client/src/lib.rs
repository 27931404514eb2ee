//! Billsync Client - HTTP access to the Dataverse Web API
//!
//! This crate provides:
//!
//! - [`auth`] - OAuth2 username/password token acquisition and caching
//! - [`dataverse`] - record queries and `$batch` transmission with retries
//!
//! [`DataverseClient`] implements [`billsync_core::SyncTarget`], so it can be
//! handed straight to a [`billsync_core::Reconciler`].

pub mod auth;
pub mod dataverse;

pub use auth::TokenCache;
pub use dataverse::{DataverseClient, RemoteRecord};

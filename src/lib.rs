//! Headshot pipeline library.
//!
//! Server side: profile storage, archive preparation, training submission
//! and webhook reconciliation. Device side (`client`): the local image store
//! and the submission client.

pub mod api;
pub mod client;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod middleware;
pub mod migration;
pub mod models;
pub mod services;

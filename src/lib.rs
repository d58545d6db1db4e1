//! Titanic survival prediction service
//!
//! Serves a random-forest survival classifier over HTTP, with a
//! natural-language front end that turns free-text passenger descriptions
//! into structured records before predicting.

pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod extraction;
pub mod metrics;
pub mod ml;
pub mod models;

pub use error::{AppError, Result};

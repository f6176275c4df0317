//! Biblio library server
//!
//! A small library management REST API: reader accounts with JWT sessions,
//! a book catalog and a loan ledger keeping each book's availability in sync
//! with its open loans.

use std::sync::Arc;

pub mod api;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}

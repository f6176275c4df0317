//! Business logic services

pub mod auth;
pub mod catalog;
pub mod loans;
pub mod redis;
pub mod tokens;

use std::sync::Arc;

use crate::{clock::Clock, config::AppConfig, repository::Repository};

use self::tokens::{TokenBlacklist, TokenService};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub auth: auth::AuthService,
    pub tokens: tokens::TokenService,
    pub catalog: catalog::CatalogService,
    pub loans: loans::LoansService,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(
        repository: Repository,
        config: &AppConfig,
        blacklist: Arc<dyn TokenBlacklist>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let tokens = TokenService::new(config.auth.clone(), blacklist);

        Self {
            auth: auth::AuthService::new(repository.clone(), tokens.clone()),
            tokens,
            catalog: catalog::CatalogService::new(repository.clone(), config.library.clone()),
            loans: loans::LoansService::new(repository, clock),
        }
    }
}

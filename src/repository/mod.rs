//! Repository layer for storage operations
//!
//! Each concern is a trait with a PostgreSQL implementation (sqlx) and an
//! in-memory one. Loan mutations that touch a book's availability are single
//! repository calls so each backend can apply them atomically.

pub mod books;
pub mod loans;
pub mod memory;
pub mod users;

use std::sync::Arc;

use sqlx::{Pool, Postgres};

use crate::error::AppError;

pub use books::{BooksRepository, PgBooksRepository};
pub use loans::{LoansRepository, PgLoansRepository};
pub use memory::InMemoryStore;
pub use users::{PgUsersRepository, UsersRepository};

/// Main repository struct holding one handle per concern
#[derive(Clone)]
pub struct Repository {
    pub users: Arc<dyn UsersRepository>,
    pub books: Arc<dyn BooksRepository>,
    pub loans: Arc<dyn LoansRepository>,
}

impl Repository {
    /// Create a repository backed by the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            users: Arc::new(PgUsersRepository::new(pool.clone())),
            books: Arc::new(PgBooksRepository::new(pool.clone())),
            loans: Arc::new(PgLoansRepository::new(pool)),
        }
    }

    /// Create a repository keeping everything in process memory
    pub fn in_memory() -> Self {
        let store = Arc::new(InMemoryStore::default());
        Self {
            users: store.clone(),
            books: store.clone(),
            loans: store,
        }
    }
}

/// Turn a PostgreSQL unique violation into a validation error
pub(crate) fn unique_violation(message: &'static str) -> impl Fn(sqlx::Error) -> AppError {
    move |e| match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            AppError::Validation(message.to_string())
        }
        other => AppError::Database(other),
    }
}

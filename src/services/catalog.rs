//! Catalog service (books)

use crate::{
    config::LibraryConfig,
    error::AppResult,
    models::{
        book::{Book, BookInput},
        user::UserClaims,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
    config: LibraryConfig,
}

impl CatalogService {
    pub fn new(repository: Repository, config: LibraryConfig) -> Self {
        Self { repository, config }
    }

    /// Staff see the whole catalog, other readers only what can be borrowed
    pub async fn list_books(&self, caller: &UserClaims) -> AppResult<Vec<Book>> {
        self.repository.books.list(!caller.is_privileged()).await
    }

    pub async fn get_book(&self, id: i32) -> AppResult<Book> {
        self.repository.books.get_by_id(id).await
    }

    pub async fn create_book(&self, caller: &UserClaims, book: BookInput) -> AppResult<Book> {
        self.check_write(caller)?;
        let created = self.repository.books.create(&book).await?;
        tracing::info!(book_id = created.id, user_id = caller.user_id, "Book created");
        Ok(created)
    }

    pub async fn update_book(&self, caller: &UserClaims, id: i32, book: BookInput) -> AppResult<Book> {
        self.check_write(caller)?;
        self.repository.books.update(id, &book).await
    }

    pub async fn delete_book(&self, caller: &UserClaims, id: i32) -> AppResult<()> {
        self.check_write(caller)?;
        self.repository.books.delete(id).await?;
        tracing::info!(book_id = id, user_id = caller.user_id, "Book deleted");
        Ok(())
    }

    // Any authenticated caller may edit the catalog unless the staff-only
    // policy is switched on.
    fn check_write(&self, caller: &UserClaims) -> AppResult<()> {
        if self.config.restrict_book_writes_to_staff {
            caller.require_staff()?;
        }
        Ok(())
    }
}

//! Books repository

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::book::{Book, BookInput},
};

use super::unique_violation;

pub(crate) const TITLE_TAKEN: &str = "titre: Un livre avec ce titre existe déjà.";

/// Book columns plus the username of the open loan holder
pub(crate) const BOOK_SELECT: &str = r#"
    SELECT b.id, b.title, b.author, b.available, b.publication_date,
           (SELECT u.username
              FROM loans l
              JOIN users u ON u.id = l.user_id
             WHERE l.book_id = b.id AND l.return_date IS NULL
             LIMIT 1) AS borrowed_by
    FROM books b
"#;

#[async_trait]
pub trait BooksRepository: Send + Sync {
    /// All books ordered by id, or only the available ones
    async fn list(&self, only_available: bool) -> AppResult<Vec<Book>>;

    async fn get_by_id(&self, id: i32) -> AppResult<Book>;

    async fn create(&self, book: &BookInput) -> AppResult<Book>;

    /// Replace title, author and publication date; availability is untouched
    async fn update(&self, id: i32, book: &BookInput) -> AppResult<Book>;

    /// Delete a book together with its loans
    async fn delete(&self, id: i32) -> AppResult<()>;
}

#[derive(Clone)]
pub struct PgBooksRepository {
    pool: Pool<Postgres>,
}

impl PgBooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BooksRepository for PgBooksRepository {
    async fn list(&self, only_available: bool) -> AppResult<Vec<Book>> {
        let query = format!(
            "{} WHERE ($1 = FALSE OR b.available = TRUE) ORDER BY b.id",
            BOOK_SELECT
        );
        let books = sqlx::query_as::<_, Book>(&query)
            .bind(only_available)
            .fetch_all(&self.pool)
            .await?;

        Ok(books)
    }

    async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        let query = format!("{} WHERE b.id = $1", BOOK_SELECT);
        sqlx::query_as::<_, Book>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    async fn create(&self, book: &BookInput) -> AppResult<Book> {
        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO books (title, author, publication_date, available)
            VALUES ($1, $2, $3, TRUE)
            RETURNING id
            "#,
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.publication_date)
        .fetch_one(&self.pool)
        .await
        .map_err(unique_violation(TITLE_TAKEN))?;

        self.get_by_id(id).await
    }

    async fn update(&self, id: i32, book: &BookInput) -> AppResult<Book> {
        let result = sqlx::query(
            "UPDATE books SET title = $2, author = $3, publication_date = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.publication_date)
        .execute(&self.pool)
        .await
        .map_err(unique_violation(TITLE_TAKEN))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }

        self.get_by_id(id).await
    }

    async fn delete(&self, id: i32) -> AppResult<()> {
        // loans go with the book (ON DELETE CASCADE)
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }
        Ok(())
    }
}

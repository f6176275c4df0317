//! Loans repository
//!
//! Every mutation that changes whether a loan is open also updates the
//! book's availability, inside one transaction.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{FromRow, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{
        book::Book,
        loan::{Loan, LoanDetails, LoanStatus, UpdateLoanRequest},
        user::UserShort,
    },
};

pub(crate) const LOAN_NOT_FOUND: &str = "Emprunt non trouvé.";
pub(crate) const LOAN_NOT_FOUND_OR_NOT_OWNED: &str = "Emprunt non trouvé ou non autorisé.";
pub(crate) const ALREADY_RETURNED: &str = "Ce livre a déjà été rendu.";
pub(crate) const BOOK_UNAVAILABLE: &str = "Ce livre n'est pas disponible.";

pub(crate) fn unknown_book(book_id: i32) -> AppError {
    AppError::Validation(format!(
        "livre_id: Clé primaire « {} » non valide - l'objet n'existe pas.",
        book_id
    ))
}

#[async_trait]
pub trait LoansRepository: Send + Sync {
    /// Loans ordered by id, optionally restricted to one borrower
    async fn list(&self, user_id: Option<i32>) -> AppResult<Vec<LoanDetails>>;

    /// Loan by id; with `owner` set, loans of other users are reported missing
    async fn get(&self, id: i32, owner: Option<i32>) -> AppResult<LoanDetails>;

    /// Claim an available book and record the loan
    async fn open(
        &self,
        user_id: i32,
        book_id: i32,
        loan_date: NaiveDate,
        expected_return_date: NaiveDate,
    ) -> AppResult<LoanDetails>;

    /// Apply the provided fields; setting a return date on an open loan
    /// releases the book
    async fn update(
        &self,
        id: i32,
        owner: Option<i32>,
        changes: &UpdateLoanRequest,
    ) -> AppResult<LoanDetails>;

    /// Return an open loan owned by `owner`
    async fn close(&self, id: i32, owner: i32, return_date: NaiveDate) -> AppResult<LoanDetails>;

    /// Delete a loan, releasing the book if it was still open
    async fn delete(&self, id: i32, owner: Option<i32>) -> AppResult<()>;
}

/// Joined loan/user/book row
#[derive(Debug, FromRow)]
struct LoanDetailsRow {
    id: i32,
    loan_date: NaiveDate,
    expected_return_date: Option<NaiveDate>,
    return_date: Option<NaiveDate>,
    user_id: i32,
    username: String,
    email: Option<String>,
    first_name: String,
    last_name: String,
    book_id: i32,
    title: String,
    author: String,
    available: bool,
    publication_date: NaiveDate,
    borrowed_by: Option<String>,
}

impl From<LoanDetailsRow> for LoanDetails {
    fn from(row: LoanDetailsRow) -> Self {
        LoanDetails {
            id: row.id,
            user: UserShort {
                id: row.user_id,
                username: row.username,
                email: row.email,
                first_name: row.first_name,
                last_name: row.last_name,
            },
            book: Book {
                id: row.book_id,
                title: row.title,
                author: row.author,
                available: row.available,
                publication_date: row.publication_date,
                borrowed_by: row.borrowed_by,
            },
            loan_date: row.loan_date,
            expected_return_date: row.expected_return_date,
            status: if row.return_date.is_some() {
                LoanStatus::Returned
            } else {
                LoanStatus::Open
            },
            return_date: row.return_date,
        }
    }
}

const LOAN_DETAILS_SELECT: &str = r#"
    SELECT l.id, l.loan_date, l.expected_return_date, l.return_date,
           u.id AS user_id, u.username, u.email, u.first_name, u.last_name,
           b.id AS book_id, b.title, b.author, b.available, b.publication_date,
           (SELECT u2.username
              FROM loans l2
              JOIN users u2 ON u2.id = l2.user_id
             WHERE l2.book_id = b.id AND l2.return_date IS NULL
             LIMIT 1) AS borrowed_by
    FROM loans l
    JOIN users u ON u.id = l.user_id
    JOIN books b ON b.id = l.book_id
"#;

#[derive(Clone)]
pub struct PgLoansRepository {
    pool: Pool<Postgres>,
}

impl PgLoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn lock_loan(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        id: i32,
        owner: Option<i32>,
        not_found: &str,
    ) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>(
            "SELECT * FROM loans WHERE id = $1 AND ($2::INTEGER IS NULL OR user_id = $2) FOR UPDATE",
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound(not_found.to_string()))
    }

    async fn release_book(tx: &mut sqlx::Transaction<'_, Postgres>, book_id: i32) -> AppResult<()> {
        sqlx::query("UPDATE books SET available = TRUE WHERE id = $1")
            .bind(book_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl LoansRepository for PgLoansRepository {
    async fn list(&self, user_id: Option<i32>) -> AppResult<Vec<LoanDetails>> {
        let query = format!(
            "{} WHERE ($1::INTEGER IS NULL OR l.user_id = $1) ORDER BY l.id",
            LOAN_DETAILS_SELECT
        );
        let rows = sqlx::query_as::<_, LoanDetailsRow>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(LoanDetails::from).collect())
    }

    async fn get(&self, id: i32, owner: Option<i32>) -> AppResult<LoanDetails> {
        let query = format!(
            "{} WHERE l.id = $1 AND ($2::INTEGER IS NULL OR l.user_id = $2)",
            LOAN_DETAILS_SELECT
        );
        sqlx::query_as::<_, LoanDetailsRow>(&query)
            .bind(id)
            .bind(owner)
            .fetch_optional(&self.pool)
            .await?
            .map(LoanDetails::from)
            .ok_or_else(|| AppError::NotFound(LOAN_NOT_FOUND.to_string()))
    }

    async fn open(
        &self,
        user_id: i32,
        book_id: i32,
        loan_date: NaiveDate,
        expected_return_date: NaiveDate,
    ) -> AppResult<LoanDetails> {
        let mut tx = self.pool.begin().await?;

        // compare-and-set on the availability flag
        let claimed: Option<i32> = sqlx::query_scalar(
            "UPDATE books SET available = FALSE WHERE id = $1 AND available = TRUE RETURNING id",
        )
        .bind(book_id)
        .fetch_optional(&mut *tx)
        .await?;

        if claimed.is_none() {
            let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE id = $1)")
                .bind(book_id)
                .fetch_one(&mut *tx)
                .await?;
            return Err(if exists {
                AppError::InvalidState(BOOK_UNAVAILABLE.to_string())
            } else {
                unknown_book(book_id)
            });
        }

        let loan_id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO loans (user_id, book_id, loan_date, expected_return_date)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .bind(loan_date)
        .bind(expected_return_date)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get(loan_id, None).await
    }

    async fn update(
        &self,
        id: i32,
        owner: Option<i32>,
        changes: &UpdateLoanRequest,
    ) -> AppResult<LoanDetails> {
        let mut tx = self.pool.begin().await?;
        let loan = Self::lock_loan(&mut tx, id, owner, LOAN_NOT_FOUND).await?;

        sqlx::query("UPDATE loans SET expected_return_date = $2, return_date = $3 WHERE id = $1")
            .bind(id)
            .bind(changes.expected_return_date.or(loan.expected_return_date))
            .bind(changes.return_date.or(loan.return_date))
            .execute(&mut *tx)
            .await?;

        if loan.is_open() && changes.return_date.is_some() {
            Self::release_book(&mut tx, loan.book_id).await?;
        }

        tx.commit().await?;

        self.get(id, None).await
    }

    async fn close(&self, id: i32, owner: i32, return_date: NaiveDate) -> AppResult<LoanDetails> {
        let mut tx = self.pool.begin().await?;
        let loan = Self::lock_loan(&mut tx, id, Some(owner), LOAN_NOT_FOUND_OR_NOT_OWNED).await?;

        if !loan.is_open() {
            return Err(AppError::InvalidState(ALREADY_RETURNED.to_string()));
        }

        sqlx::query("UPDATE loans SET return_date = $2 WHERE id = $1")
            .bind(id)
            .bind(return_date)
            .execute(&mut *tx)
            .await?;
        Self::release_book(&mut tx, loan.book_id).await?;

        tx.commit().await?;

        self.get(id, None).await
    }

    async fn delete(&self, id: i32, owner: Option<i32>) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        let loan = Self::lock_loan(&mut tx, id, owner, LOAN_NOT_FOUND).await?;

        sqlx::query("DELETE FROM loans WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if loan.is_open() {
            Self::release_book(&mut tx, loan.book_id).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

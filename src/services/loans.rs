//! Loan management service

use std::sync::Arc;

use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    models::{
        loan::{CreateLoanRequest, LoanDetails, UpdateLoanRequest},
        user::UserClaims,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    clock: Arc<dyn Clock>,
}

/// Staff act on any loan, other callers only on their own
fn scope(caller: &UserClaims) -> Option<i32> {
    if caller.is_privileged() {
        None
    } else {
        Some(caller.user_id)
    }
}

impl LoansService {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    pub async fn list_loans(&self, caller: &UserClaims) -> AppResult<Vec<LoanDetails>> {
        self.repository.loans.list(scope(caller)).await
    }

    pub async fn get_loan(&self, caller: &UserClaims, id: i32) -> AppResult<LoanDetails> {
        self.repository.loans.get(id, scope(caller)).await
    }

    /// Borrow a book for the caller
    pub async fn create_loan(
        &self,
        caller: &UserClaims,
        request: CreateLoanRequest,
    ) -> AppResult<LoanDetails> {
        let book_id = request
            .livre_id
            .ok_or_else(|| AppError::Validation("livre_id: Ce champ est requis.".to_string()))?;
        let expected_return_date = request.date_retour_prevue.ok_or_else(|| {
            AppError::Validation("date_retour_prevue: Ce champ est requis.".to_string())
        })?;

        let loan = self
            .repository
            .loans
            .open(caller.user_id, book_id, self.clock.today(), expected_return_date)
            .await?;

        tracing::info!(loan_id = loan.id, book_id, user_id = caller.user_id, "Loan opened");
        Ok(loan)
    }

    pub async fn update_loan(
        &self,
        caller: &UserClaims,
        id: i32,
        changes: UpdateLoanRequest,
    ) -> AppResult<LoanDetails> {
        self.repository.loans.update(id, scope(caller), &changes).await
    }

    pub async fn delete_loan(&self, caller: &UserClaims, id: i32) -> AppResult<()> {
        self.repository.loans.delete(id, scope(caller)).await
    }

    /// Return a loan held by the caller, stamped with today's date
    ///
    /// Ownership is checked even for staff: someone else's loan is reported
    /// as missing.
    pub async fn return_loan(&self, caller: &UserClaims, id: i32) -> AppResult<LoanDetails> {
        let loan = self
            .repository
            .loans
            .close(id, caller.user_id, self.clock.today())
            .await?;

        tracing::info!(loan_id = id, book_id = loan.book.id, "Loan returned");
        Ok(loan)
    }
}

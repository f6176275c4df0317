//! Loan (emprunt) model and related types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::book::Book;
use super::user::UserShort;

/// Loan row from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Loan {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    pub loan_date: NaiveDate,
    pub expected_return_date: Option<NaiveDate>,
    pub return_date: Option<NaiveDate>,
}

/// Two-state loan lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Open,
    Returned,
}

impl Loan {
    pub fn status(&self) -> LoanStatus {
        if self.return_date.is_some() {
            LoanStatus::Returned
        } else {
            LoanStatus::Open
        }
    }

    pub fn is_open(&self) -> bool {
        self.status() == LoanStatus::Open
    }
}

/// Loan with its borrower and book, as returned to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LoanDetails {
    pub id: i32,
    #[serde(rename = "utilisateur")]
    pub user: UserShort,
    #[serde(rename = "livre")]
    pub book: Book,
    #[serde(rename = "date_emprunt")]
    pub loan_date: NaiveDate,
    #[serde(rename = "date_retour_prevue")]
    pub expected_return_date: Option<NaiveDate>,
    #[serde(rename = "date_retour")]
    pub return_date: Option<NaiveDate>,
    pub status: LoanStatus,
}

/// Create loan request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateLoanRequest {
    #[validate(required(message = "Ce champ est requis."))]
    pub livre_id: Option<i32>,
    #[validate(required(message = "Ce champ est requis."))]
    pub date_retour_prevue: Option<NaiveDate>,
}

/// Loan update request; fields left out are kept
#[derive(Debug, Default, Clone, Deserialize, Validate, ToSchema)]
pub struct UpdateLoanRequest {
    #[serde(rename = "date_retour_prevue")]
    pub expected_return_date: Option<NaiveDate>,
    #[serde(rename = "date_retour")]
    pub return_date: Option<NaiveDate>,
}

/// Response of the return endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReturnResponse {
    pub detail: String,
    #[serde(rename = "emprunt")]
    pub loan: LoanDetails,
}

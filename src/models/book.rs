//! Book (livre) model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// Book as stored and returned to clients
///
/// `disponible` is maintained by the loan ledger and never taken from a
/// request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    #[serde(rename = "titre")]
    pub title: String,
    #[serde(rename = "auteur")]
    pub author: String,
    #[serde(rename = "disponible")]
    pub available: bool,
    #[serde(rename = "date_publication")]
    pub publication_date: NaiveDate,
    /// Username holding the open loan, if any
    #[serde(rename = "emprunte_par")]
    pub borrowed_by: Option<String>,
}

/// Create/update payload
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct BookInput {
    #[serde(rename = "titre")]
    #[validate(length(min = 1, max = 200, message = "Le titre doit faire entre 1 et 200 caractères."))]
    pub title: String,
    #[serde(rename = "auteur")]
    #[validate(length(min = 1, max = 100, message = "L'auteur doit faire entre 1 et 100 caractères."))]
    pub author: String,
    #[serde(rename = "date_publication")]
    pub publication_date: NaiveDate,
}

//! Data models for biblio

pub mod book;
pub mod loan;
pub mod user;

// Re-export commonly used types
pub use book::{Book, BookInput};
pub use loan::{Loan, LoanDetails, LoanStatus};
pub use user::{User, UserClaims, UserShort};

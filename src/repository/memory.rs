//! In-memory storage backend
//!
//! Users, books and loans live behind a single lock, so every loan mutation
//! and the matching availability change happen under one write guard.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookInput},
        loan::{Loan, LoanDetails, UpdateLoanRequest},
        user::{NewUser, UpdateProfile, User, UserShort},
    },
};

use super::{
    books::{BooksRepository, TITLE_TAKEN},
    loans::{
        unknown_book, LoansRepository, ALREADY_RETURNED, BOOK_UNAVAILABLE, LOAN_NOT_FOUND,
        LOAN_NOT_FOUND_OR_NOT_OWNED,
    },
    users::{UsersRepository, USERNAME_TAKEN},
};

#[derive(Debug, Clone)]
struct BookRecord {
    id: i32,
    title: String,
    author: String,
    available: bool,
    publication_date: NaiveDate,
}

#[derive(Default)]
struct State {
    users: BTreeMap<i32, User>,
    books: BTreeMap<i32, BookRecord>,
    loans: BTreeMap<i32, Loan>,
    last_user_id: i32,
    last_book_id: i32,
    last_loan_id: i32,
}

impl State {
    fn user(&self, id: i32) -> AppResult<&User> {
        self.users
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    fn username_taken(&self, username: &str, exclude_id: Option<i32>) -> bool {
        self.users
            .values()
            .any(|u| u.username == username && Some(u.id) != exclude_id)
    }

    fn title_taken(&self, title: &str, exclude_id: Option<i32>) -> bool {
        self.books
            .values()
            .any(|b| b.title == title && Some(b.id) != exclude_id)
    }

    fn book(&self, id: i32) -> AppResult<Book> {
        let record = self
            .books
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        let borrowed_by = self
            .loans
            .values()
            .find(|l| l.book_id == id && l.is_open())
            .and_then(|l| self.users.get(&l.user_id))
            .map(|u| u.username.clone());

        Ok(Book {
            id: record.id,
            title: record.title.clone(),
            author: record.author.clone(),
            available: record.available,
            publication_date: record.publication_date,
            borrowed_by,
        })
    }

    fn details(&self, loan: &Loan) -> AppResult<LoanDetails> {
        Ok(LoanDetails {
            id: loan.id,
            user: UserShort::from(self.user(loan.user_id)?),
            book: self.book(loan.book_id)?,
            loan_date: loan.loan_date,
            expected_return_date: loan.expected_return_date,
            return_date: loan.return_date,
            status: loan.status(),
        })
    }

    fn owned_loan(&self, id: i32, owner: Option<i32>, not_found: &str) -> AppResult<Loan> {
        self.loans
            .get(&id)
            .filter(|l| owner.map_or(true, |o| l.user_id == o))
            .cloned()
            .ok_or_else(|| AppError::NotFound(not_found.to_string()))
    }

    fn set_available(&mut self, book_id: i32, available: bool) {
        if let Some(book) = self.books.get_mut(&book_id) {
            book.available = available;
        }
    }
}

/// Process-local store implementing every repository trait
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

#[async_trait]
impl UsersRepository for InMemoryStore {
    async fn get_by_id(&self, id: i32) -> AppResult<User> {
        self.state.read().user(id).cloned()
    }

    async fn get_by_username(&self, username: &str) -> AppResult<Option<User>> {
        Ok(self
            .state
            .read()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn create(&self, user: &NewUser) -> AppResult<User> {
        let mut state = self.state.write();
        if state.username_taken(&user.username, None) {
            return Err(AppError::Validation(USERNAME_TAKEN.to_string()));
        }

        state.last_user_id += 1;
        let created = User {
            id: state.last_user_id,
            username: user.username.clone(),
            email: user.email.clone(),
            password: user.password_hash.clone(),
            first_name: String::new(),
            last_name: String::new(),
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
            is_active: true,
            last_login: None,
            date_joined: Utc::now(),
        };
        state.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_profile(&self, id: i32, profile: &UpdateProfile) -> AppResult<User> {
        let mut state = self.state.write();
        if let Some(ref username) = profile.username {
            if state.username_taken(username, Some(id)) {
                return Err(AppError::Validation(USERNAME_TAKEN.to_string()));
            }
        }

        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))?;

        if let Some(ref username) = profile.username {
            user.username = username.clone();
        }
        if let Some(ref email) = profile.email {
            user.email = Some(email.clone());
        }
        if let Some(ref first_name) = profile.first_name {
            user.first_name = first_name.clone();
        }
        if let Some(ref last_name) = profile.last_name {
            user.last_name = last_name.clone();
        }
        Ok(user.clone())
    }

    async fn set_password(&self, id: i32, password_hash: &str) -> AppResult<()> {
        let mut state = self.state.write();
        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))?;
        user.password = password_hash.to_string();
        Ok(())
    }

    async fn touch_last_login(&self, id: i32, at: DateTime<Utc>) -> AppResult<()> {
        if let Some(user) = self.state.write().users.get_mut(&id) {
            user.last_login = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl BooksRepository for InMemoryStore {
    async fn list(&self, only_available: bool) -> AppResult<Vec<Book>> {
        let state = self.state.read();
        state
            .books
            .values()
            .filter(|b| !only_available || b.available)
            .map(|b| state.book(b.id))
            .collect()
    }

    async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        self.state.read().book(id)
    }

    async fn create(&self, book: &BookInput) -> AppResult<Book> {
        let mut state = self.state.write();
        if state.title_taken(&book.title, None) {
            return Err(AppError::Validation(TITLE_TAKEN.to_string()));
        }

        state.last_book_id += 1;
        let id = state.last_book_id;
        state.books.insert(
            id,
            BookRecord {
                id,
                title: book.title.clone(),
                author: book.author.clone(),
                available: true,
                publication_date: book.publication_date,
            },
        );
        state.book(id)
    }

    async fn update(&self, id: i32, book: &BookInput) -> AppResult<Book> {
        let mut state = self.state.write();
        if state.title_taken(&book.title, Some(id)) {
            return Err(AppError::Validation(TITLE_TAKEN.to_string()));
        }

        let record = state
            .books
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;
        record.title = book.title.clone();
        record.author = book.author.clone();
        record.publication_date = book.publication_date;

        state.book(id)
    }

    async fn delete(&self, id: i32) -> AppResult<()> {
        let mut state = self.state.write();
        if state.books.remove(&id).is_none() {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }
        state.loans.retain(|_, l| l.book_id != id);
        Ok(())
    }
}

#[async_trait]
impl LoansRepository for InMemoryStore {
    async fn list(&self, user_id: Option<i32>) -> AppResult<Vec<LoanDetails>> {
        let state = self.state.read();
        state
            .loans
            .values()
            .filter(|l| user_id.map_or(true, |u| l.user_id == u))
            .map(|l| state.details(l))
            .collect()
    }

    async fn get(&self, id: i32, owner: Option<i32>) -> AppResult<LoanDetails> {
        let state = self.state.read();
        let loan = state.owned_loan(id, owner, LOAN_NOT_FOUND)?;
        state.details(&loan)
    }

    async fn open(
        &self,
        user_id: i32,
        book_id: i32,
        loan_date: NaiveDate,
        expected_return_date: NaiveDate,
    ) -> AppResult<LoanDetails> {
        let mut state = self.state.write();
        state.user(user_id)?;

        match state.books.get_mut(&book_id) {
            None => return Err(unknown_book(book_id)),
            Some(book) if !book.available => {
                return Err(AppError::InvalidState(BOOK_UNAVAILABLE.to_string()))
            }
            Some(book) => book.available = false,
        }

        state.last_loan_id += 1;
        let loan = Loan {
            id: state.last_loan_id,
            user_id,
            book_id,
            loan_date,
            expected_return_date: Some(expected_return_date),
            return_date: None,
        };
        state.loans.insert(loan.id, loan.clone());
        state.details(&loan)
    }

    async fn update(
        &self,
        id: i32,
        owner: Option<i32>,
        changes: &UpdateLoanRequest,
    ) -> AppResult<LoanDetails> {
        let mut state = self.state.write();
        let mut loan = state.owned_loan(id, owner, LOAN_NOT_FOUND)?;
        let was_open = loan.is_open();

        if changes.expected_return_date.is_some() {
            loan.expected_return_date = changes.expected_return_date;
        }
        if changes.return_date.is_some() {
            loan.return_date = changes.return_date;
        }
        state.loans.insert(id, loan.clone());

        if was_open && changes.return_date.is_some() {
            state.set_available(loan.book_id, true);
        }
        state.details(&loan)
    }

    async fn close(&self, id: i32, owner: i32, return_date: NaiveDate) -> AppResult<LoanDetails> {
        let mut state = self.state.write();
        let mut loan = state.owned_loan(id, Some(owner), LOAN_NOT_FOUND_OR_NOT_OWNED)?;

        if !loan.is_open() {
            return Err(AppError::InvalidState(ALREADY_RETURNED.to_string()));
        }

        loan.return_date = Some(return_date);
        state.loans.insert(id, loan.clone());
        state.set_available(loan.book_id, true);
        state.details(&loan)
    }

    async fn delete(&self, id: i32, owner: Option<i32>) -> AppResult<()> {
        let mut state = self.state.write();
        let loan = state.owned_loan(id, owner, LOAN_NOT_FOUND)?;

        state.loans.remove(&id);
        if loan.is_open() {
            state.set_available(loan.book_id, true);
        }
        Ok(())
    }
}

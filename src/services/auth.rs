//! Authentication and account service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;

use crate::{
    error::{AppError, AppResult},
    models::user::{
        ChangePasswordRequest, LoginRequest, NewUser, RegisterRequest, RegisterResponse,
        TokenPair, UpdateProfile, User,
    },
    repository::Repository,
};

use super::tokens::TokenService;

const INVALID_CREDENTIALS: &str = "Aucun compte actif n'a été trouvé avec les identifiants fournis.";
pub const MISSING_PASSWORDS: &str = "Veuillez fournir l'ancien et le nouveau mot de passe.";
pub const WRONG_OLD_PASSWORD: &str = "Ancien mot de passe incorrect.";

#[derive(Clone)]
pub struct AuthService {
    repository: Repository,
    tokens: TokenService,
}

impl AuthService {
    pub fn new(repository: Repository, tokens: TokenService) -> Self {
        Self { repository, tokens }
    }

    /// Register a new account and open a session for it
    pub async fn register(&self, request: RegisterRequest) -> AppResult<RegisterResponse> {
        let user = self
            .create_account(request.username, request.email, &request.password, false)
            .await?;
        let pair = self.tokens.issue_pair(&user)?;

        tracing::info!(user_id = user.id, username = %user.username, "User registered");

        Ok(RegisterResponse {
            id: user.id,
            username: user.username,
            email: user.email,
            access: pair.access,
            refresh: pair.refresh,
        })
    }

    /// Create an account with staff and superuser rights
    pub async fn create_superuser(
        &self,
        username: String,
        email: Option<String>,
        password: &str,
    ) -> AppResult<User> {
        let user = self.create_account(username, email, password, true).await?;
        tracing::info!(user_id = user.id, username = %user.username, "Superuser created");
        Ok(user)
    }

    async fn create_account(
        &self,
        username: String,
        email: Option<String>,
        password: &str,
        privileged: bool,
    ) -> AppResult<User> {
        let new_user = NewUser {
            username,
            email,
            password_hash: self.hash_password(password)?,
            is_staff: privileged,
            is_superuser: privileged,
        };

        self.repository.users.create(&new_user).await
    }

    /// Authenticate by username and password and return a token pair
    pub async fn login(&self, request: LoginRequest) -> AppResult<TokenPair> {
        let user = self
            .repository
            .users
            .get_by_username(&request.username)
            .await?
            .ok_or_else(|| AppError::Authentication(INVALID_CREDENTIALS.to_string()))?;

        if !user.is_active || !self.verify_password(&user, &request.password)? {
            tracing::warn!(username = %request.username, "Rejected login attempt");
            return Err(AppError::Authentication(INVALID_CREDENTIALS.to_string()));
        }

        self.repository
            .users
            .touch_last_login(user.id, Utc::now())
            .await?;

        tracing::info!(user_id = user.id, "User logged in");
        self.tokens.issue_pair(&user)
    }

    /// Revoke a refresh token
    pub async fn logout(&self, refresh: &str) -> AppResult<()> {
        let claims = self.tokens.revoke_refresh(refresh).await?;
        tracing::info!(user_id = claims.user_id, "User logged out");
        Ok(())
    }

    /// Issue a new access token from a valid refresh token
    pub async fn refresh(&self, refresh: &str) -> AppResult<String> {
        let claims = self.tokens.decode_refresh(refresh).await?;

        let user = match self.repository.users.get_by_id(claims.user_id).await {
            Ok(user) if user.is_active => user,
            Ok(_) | Err(AppError::NotFound(_)) => {
                return Err(AppError::Authentication("User not found or inactive".to_string()))
            }
            Err(e) => return Err(e),
        };

        self.tokens.issue_access(&user)
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<User> {
        self.repository.users.get_by_id(id).await
    }

    /// Update the caller's own profile
    pub async fn update_profile(&self, user_id: i32, profile: UpdateProfile) -> AppResult<User> {
        self.repository.users.update_profile(user_id, &profile).await
    }

    /// Change the caller's password after checking the current one
    pub async fn change_password(&self, user_id: i32, request: ChangePasswordRequest) -> AppResult<()> {
        let (old_password, new_password) = match (request.old_password, request.new_password) {
            (Some(old), Some(new)) if !old.is_empty() && !new.is_empty() => (old, new),
            _ => return Err(AppError::Validation(MISSING_PASSWORDS.to_string())),
        };

        let user = self.repository.users.get_by_id(user_id).await?;
        if !self.verify_password(&user, &old_password)? {
            return Err(AppError::Validation(WRONG_OLD_PASSWORD.to_string()));
        }

        let hash = self.hash_password(&new_password)?;
        self.repository.users.set_password(user_id, &hash).await?;

        tracing::info!(user_id, "Password changed");
        Ok(())
    }

    /// Verify user password
    fn verify_password(&self, user: &User, password: &str) -> AppResult<bool> {
        let parsed_hash = PasswordHash::new(&user.password)
            .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    /// Hash a password using Argon2
    pub fn hash_password(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();
        let hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
        Ok(hash.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AuthConfig, repository::users::USERNAME_TAKEN, services::tokens::InMemoryBlacklist,
    };

    fn service() -> AuthService {
        let tokens = TokenService::new(
            AuthConfig {
                jwt_secret: "test-secret".to_string(),
                access_token_minutes: 5,
                refresh_token_days: 1,
            },
            Arc::new(InMemoryBlacklist::default()),
        );
        AuthService::new(Repository::in_memory(), tokens)
    }

    fn registration(username: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            email: Some(format!("{}@example.com", username)),
            password: password.to_string(),
            password2: None,
        }
    }

    fn login(username: &str, password: &str) -> LoginRequest {
        LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let auth = service();
        let registered = auth.register(registration("alice", "pwd123")).await.unwrap();
        assert_eq!(registered.username, "alice");
        assert!(!registered.access.is_empty());
        assert!(!registered.refresh.is_empty());

        assert!(auth.login(login("alice", "pwd123")).await.is_ok());
        assert!(auth.get_by_id(registered.id).await.unwrap().last_login.is_some());
        assert!(matches!(
            auth.login(login("alice", "wrongpwd")).await,
            Err(AppError::Authentication(_))
        ));
        assert!(matches!(
            auth.login(login("nobody", "pwd123")).await,
            Err(AppError::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn test_taken_username_is_rejected() {
        let auth = service();
        auth.register(registration("alice", "pwd123")).await.unwrap();
        let bob = auth.register(registration("bob", "pwd123")).await.unwrap();

        assert!(matches!(
            auth.register(registration("alice", "other")).await,
            Err(AppError::Validation(ref m)) if m == USERNAME_TAKEN
        ));

        let rename = UpdateProfile {
            username: Some("alice".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            auth.update_profile(bob.id, rename).await,
            Err(AppError::Validation(ref m)) if m == USERNAME_TAKEN
        ));
    }

    #[tokio::test]
    async fn test_change_password() {
        let auth = service();
        let registered = auth.register(registration("alice", "pwd123")).await.unwrap();

        let wrong = auth
            .change_password(
                registered.id,
                ChangePasswordRequest {
                    old_password: Some("nope".to_string()),
                    new_password: Some("newpwd".to_string()),
                },
            )
            .await;
        match wrong {
            Err(AppError::Validation(msg)) => assert_eq!(msg, WRONG_OLD_PASSWORD),
            other => panic!("unexpected result: {:?}", other),
        }

        let missing = auth
            .change_password(
                registered.id,
                ChangePasswordRequest {
                    old_password: Some("pwd123".to_string()),
                    new_password: None,
                },
            )
            .await;
        assert!(matches!(missing, Err(AppError::Validation(ref m)) if m == MISSING_PASSWORDS));

        let empty = auth
            .change_password(
                registered.id,
                ChangePasswordRequest {
                    old_password: Some("pwd123".to_string()),
                    new_password: Some(String::new()),
                },
            )
            .await;
        assert!(matches!(empty, Err(AppError::Validation(ref m)) if m == MISSING_PASSWORDS));

        // a short new password does not hide a wrong old one
        let short = auth
            .change_password(
                registered.id,
                ChangePasswordRequest {
                    old_password: Some("nope".to_string()),
                    new_password: Some("abc".to_string()),
                },
            )
            .await;
        assert!(matches!(short, Err(AppError::Validation(ref m)) if m == WRONG_OLD_PASSWORD));

        auth.change_password(
            registered.id,
            ChangePasswordRequest {
                old_password: Some("pwd123".to_string()),
                new_password: Some("newpwd".to_string()),
            },
        )
        .await
        .unwrap();

        assert!(auth.login(login("alice", "pwd123")).await.is_err());
        assert!(auth.login(login("alice", "newpwd")).await.is_ok());
    }

    #[tokio::test]
    async fn test_logout_blocks_refresh() {
        let auth = service();
        let registered = auth.register(registration("alice", "pwd123")).await.unwrap();

        assert!(auth.refresh(&registered.refresh).await.is_ok());
        auth.logout(&registered.refresh).await.unwrap();
        assert!(matches!(
            auth.refresh(&registered.refresh).await,
            Err(AppError::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn test_superuser_has_staff_rights() {
        let auth = service();
        let admin = auth
            .create_superuser("admin".to_string(), None, "secret")
            .await
            .unwrap();
        assert!(admin.is_staff && admin.is_superuser);
    }
}

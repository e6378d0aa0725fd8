use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::db::{DBService, User};
use crate::error::{require_fields, AppError, Result};
use crate::password::PasswordHasher;
use crate::token::TokenManager;

/// Where accounts live. Signup and signin only need these two calls.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Must fail with [`AppError::DuplicateUsername`] when the username is taken.
    async fn insert(&self, user: &User) -> Result<()>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;
}

#[async_trait]
impl UserStore for DBService {
    async fn insert(&self, user: &User) -> Result<()> {
        self.insert_user(user).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        self.find_user_by_username(username).await
    }
}

pub struct Signup {
    pub fullname: String,
    pub nidn: String,
    pub username: String,
    pub password: String,
}

/// A user as it can be shown back to clients, without the hash.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PublicUser {
    pub id: String,
    pub fullname: String,
    pub nidn: String,
    pub username: String,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            fullname: user.fullname,
            nidn: user.nidn,
            username: user.username,
        }
    }
}

pub async fn signup<S>(store: &S, hasher: &PasswordHasher, form: Signup) -> Result<PublicUser>
where
    S: UserStore + ?Sized,
{
    require_fields(&[
        ("fullname", form.fullname.as_str()),
        ("nidn", form.nidn.as_str()),
        ("username", form.username.as_str()),
        ("password", form.password.as_str()),
    ])?;

    let user = User {
        id: Uuid::new_v4().to_string(),
        fullname: form.fullname,
        nidn: form.nidn,
        username: form.username,
        password: hasher.hash_blocking(form.password).await?,
    };
    store.insert(&user).await?;
    Ok(user.into())
}

pub async fn signin<S>(
    store: &S,
    hasher: &PasswordHasher,
    tokens: &TokenManager,
    username: &str,
    password: &str,
) -> Result<String>
where
    S: UserStore + ?Sized,
{
    require_fields(&[("username", username), ("password", password)])?;

    let user = store
        .find_by_username(username)
        .await?
        .ok_or_else(|| AppError::UserNotFound(username.to_owned()))?;

    if !hasher
        .verify_blocking(password.to_owned(), user.password.clone())
        .await?
    {
        return Err(AppError::WrongPassword {
            username: user.username,
        });
    }

    tracing::info!("Authenticated user {}", user.username);
    tokens.issue(&user)
}

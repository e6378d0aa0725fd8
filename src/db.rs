use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use crate::error::{AppError, DBErrorContext, Result};

#[derive(Debug, Clone)]
pub struct DBService {
    pool: Pool<Sqlite>,
}

/// A row of the `users` table. `password` holds the PHC hash.
#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub fullname: String,
    pub nidn: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

impl DBService {
    pub async fn new(db_url: &str, pool_config: PoolConfig) -> Result<Self> {
        let init_error = |source| AppError::DBInitError {
            url: db_url.to_owned(),
            source,
        };

        // WAL lets readers (signin) proceed while a signup insert is in flight.
        let options = SqliteConnectOptions::from_str(db_url)
            .map_err(init_error)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_config.max_connections)
            .acquire_timeout(pool_config.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(init_error)?;

        Ok(DBService { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn insert_user(&self, user: &User) -> Result<()> {
        let res = sqlx::query(
            "INSERT INTO users (id, fullname, nidn, username, password)
            VALUES (?,?,?,?,?)",
        )
        .bind(&user.id)
        .bind(&user.fullname)
        .bind(&user.nidn)
        .bind(&user.username)
        .bind(&user.password)
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => {
                tracing::info!("User {} created with id {}", user.username, user.id);
                Ok(())
            }
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Err(AppError::DuplicateUsername(user.username.clone()))
            }
            Err(err) => Err(err).with_context(|| format!("Cannot insert user {}", user.username)),
        }
    }

    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE username=? LIMIT 1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Cannot look up user {username}"))
    }

    pub async fn count_users(&self) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .with_context(|| "Cannot count users")
    }

    pub async fn close(&self) {
        self.pool.close().await
    }
}

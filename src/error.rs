use std::fmt;
use std::path::{Path, PathBuf};

use axum::{
    extract::multipart::MultipartError,
    response::{IntoResponse, Response},
    Json,
};
use hyper::StatusCode;

pub type Result<T> = std::result::Result<T, AppError>;

/// Which filesystem operation failed, so the client gets a message that
/// names the action without the underlying I/O detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsOp {
    Read,
    Create,
    Upload,
    Delete,
}

impl fmt::Display for FsOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            FsOp::Read => "read",
            FsOp::Create => "create",
            FsOp::Upload => "upload",
            FsOp::Delete => "delete",
        };
        f.write_str(op)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid path {0:?}")]
    InvalidPath(String),

    #[error("Missing or malformed bearer token")]
    MissingToken,

    #[error("Invalid token: {0}")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),

    #[error("Wrong password for {username}")]
    WrongPassword { username: String },

    #[error("No user named {0}")]
    UserNotFound(String),

    #[error("Folder not found: {0:?}")]
    FolderNotFound(String),

    #[error("Item not found: {0:?}")]
    ItemNotFound(String),

    #[error("No route for {0}")]
    RouteNotFound(String),

    #[error("Username {0} already taken")]
    DuplicateUsername(String),

    #[error("{0:?} already exists")]
    AlreadyExists(String),

    #[error("Cannot {op} {path:?}: {source}")]
    Filesystem {
        op: FsOp,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("DB error at {url}: {source}")]
    DBInitError { url: String, source: sqlx::Error },

    #[error("DB error {message} - {source}")]
    DBError {
        message: String,
        source: sqlx::Error,
    },

    #[error("Migration error {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Password hashing error {0}")]
    HashError(password_hash::Error),

    #[error("Cannot sign token: {0}")]
    TokenGeneration(#[source] jsonwebtoken::errors::Error),

    #[error("Malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unhandled failure: {0}")]
    Unhandled(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingField(_)
            | AppError::InvalidRequest(_)
            | AppError::InvalidPath(_) => StatusCode::BAD_REQUEST,
            // 413 when the body limit is hit, 400 for a broken body
            AppError::Multipart(err) => err.status(),
            AppError::MissingToken | AppError::WrongPassword { .. } => StatusCode::UNAUTHORIZED,
            AppError::InvalidToken(_) => StatusCode::FORBIDDEN,
            AppError::UserNotFound(_)
            | AppError::FolderNotFound(_)
            | AppError::ItemNotFound(_)
            | AppError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            AppError::DuplicateUsername(_) | AppError::AlreadyExists(_) => StatusCode::CONFLICT,
            AppError::Filesystem { .. }
            | AppError::DBInitError { .. }
            | AppError::DBError { .. }
            | AppError::MigrationError(_)
            | AppError::HashError(_)
            | AppError::TokenGeneration(_)
            | AppError::Join(_)
            | AppError::Config(_)
            | AppError::Unhandled(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// What the caller gets to see. Server-side failures never leak their
    /// source here, only through the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::MissingField(_) | AppError::DuplicateUsername(_) => self.to_string(),
            AppError::InvalidRequest(reason) => reason.clone(),
            AppError::InvalidPath(_) => "Invalid path".to_string(),
            AppError::MissingToken => "Token missing or malformed".to_string(),
            AppError::InvalidToken(_) => "Invalid token".to_string(),
            AppError::WrongPassword { .. } => "Wrong password".to_string(),
            AppError::UserNotFound(_) => "User not found".to_string(),
            AppError::FolderNotFound(_) => "Folder not found".to_string(),
            AppError::ItemNotFound(_) => "Item not found".to_string(),
            AppError::RouteNotFound(_) => "Endpoint not found".to_string(),
            AppError::AlreadyExists(name) => format!("\"{name}\" already exists"),
            AppError::Multipart(_) if self.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                "Upload too large".to_string()
            }
            AppError::Multipart(_) => "Malformed multipart body".to_string(),
            AppError::Filesystem { op, .. } => match op {
                FsOp::Read => "Failed to read directory".to_string(),
                FsOp::Create => "Failed to create folder".to_string(),
                FsOp::Upload => "Failed to upload file".to_string(),
                FsOp::Delete => "Failed to delete item".to_string(),
            },
            _ => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Server error: {self:?}");
        } else {
            tracing::debug!("Client error {status}: {self}");
        }
        let body = serde_json::json!({ "message": self.public_message() });
        (status, Json(body)).into_response()
    }
}

impl From<password_hash::Error> for AppError {
    fn from(err: password_hash::Error) -> Self {
        AppError::HashError(err)
    }
}

pub(crate) trait DBErrorContext<T> {
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: ToString + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T> DBErrorContext<T> for sqlx::Result<T> {
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: ToString + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|source| AppError::DBError {
            message: f().to_string(),
            source,
        })
    }
}

pub(crate) trait IoContext<T> {
    fn io_context(self, op: FsOp, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for std::result::Result<T, std::io::Error> {
    fn io_context(self, op: FsOp, path: &Path) -> Result<T> {
        self.map_err(|source| AppError::Filesystem {
            op,
            path: path.to_owned(),
            source,
        })
    }
}

/// Rejects the first empty value, reporting it under its wire name.
pub(crate) fn require_fields(fields: &[(&'static str, &str)]) -> Result<()> {
    match fields.iter().find(|(_, value)| value.is_empty()) {
        Some((name, _)) => Err(AppError::MissingField(name)),
        None => Ok(()),
    }
}

use std::io::{self, ErrorKind};
use std::result::Result as StdResult;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::QueryRejection,
        Multipart, Query, State,
    },
    http::StatusCode,
    Extension, Json,
};
use futures::TryStreamExt;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, FsOp, Result};
use crate::handlers::extract::Payload;
use crate::storage::{Entry, EntryKind, LocalStorage};
use crate::token::Claims;

#[derive(Deserialize, Debug)]
pub(crate) struct ListQuery {
    #[serde(default)]
    path: String,
}

#[derive(Deserialize, Debug)]
pub(crate) struct CreateFolderForm {
    path: Option<String>,
    #[serde(rename = "folderName")]
    folder_name: Option<String>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct DeleteForm {
    path: Option<String>,
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

pub(crate) async fn list(
    State(storage): State<LocalStorage>,
    query: StdResult<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<Entry>>> {
    let Query(query) = query.map_err(|rejection| AppError::InvalidRequest(rejection.body_text()))?;
    Ok(Json(storage.list(&query.path).await?))
}

pub(crate) async fn create_folder(
    State(storage): State<LocalStorage>,
    Extension(claims): Extension<Claims>,
    Payload(form): Payload<CreateFolderForm>,
) -> Result<(StatusCode, Json<Value>)> {
    let relative = form.path.unwrap_or_default();
    let folder_name = form.folder_name.unwrap_or_default();
    let created = storage.create_folder(&relative, &folder_name).await?;
    tracing::info!("{} created folder {:?}", claims.username, created);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Folder created successfully" })),
    ))
}

/// Expects a `file` field and optionally a `path` field. Fields are read in
/// order, so `path` only counts when it comes before `file`.
pub(crate) async fn upload(
    State(storage): State<LocalStorage>,
    Extension(claims): Extension<Claims>,
    multipart: StdResult<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<Value>)> {
    let mut multipart =
        multipart.map_err(|rejection| AppError::InvalidRequest(rejection.body_text()))?;

    let mut relative = String::new();
    let mut uploaded = None;
    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().map(str::to_owned);
        tracing::debug!(
            "got a new field {:?} of type {:?} for file {:?}",
            field_name,
            field.content_type(),
            field.file_name(),
        );

        match field_name.as_deref() {
            Some("path") if uploaded.is_none() => relative = field.text().await?,
            Some("file") if uploaded.is_none() => {
                let file_name = field.file_name().unwrap_or_default().to_owned();
                let reader = field
                    .map_err(|err| io::Error::new(ErrorKind::Other, err))
                    .into_async_read();
                let stored = storage.upload(&relative, &file_name, reader).await;
                uploaded = Some(stored.map_err(body_failure)?);
            }
            _ => tracing::debug!("Ignoring multipart field {:?}", field_name),
        }
    }

    let (file_name, bytes) = uploaded.ok_or(AppError::MissingField("file"))?;
    tracing::info!(
        "{} uploaded {:?} ({} bytes) into {:?}",
        claims.username,
        file_name,
        bytes,
        relative
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": format!("File \"{file_name}\" uploaded successfully"),
            "filename": file_name,
        })),
    ))
}

pub(crate) async fn delete(
    State(storage): State<LocalStorage>,
    Extension(claims): Extension<Claims>,
    Payload(form): Payload<DeleteForm>,
) -> Result<Json<Value>> {
    let relative = form.path.unwrap_or_default();
    let name = form.name.unwrap_or_default();
    let kind = EntryKind::parse(form.kind.as_deref().unwrap_or_default())?;

    storage.delete(&relative, &name, kind).await?;
    tracing::info!("{} deleted {:?} {:?} in {:?}", claims.username, kind, name, relative);

    Ok(Json(json!({ "message": format!("\"{name}\" deleted successfully") })))
}

/// A write that failed because the request body broke (or went over the
/// limit) is the client's fault, not the disk's.
fn body_failure(err: AppError) -> AppError {
    match err {
        AppError::Filesystem { op: FsOp::Upload, path, source }
            if source.get_ref().map_or(false, |inner| inner.is::<MultipartError>()) =>
        {
            match source.into_inner().map(|inner| inner.downcast::<MultipartError>()) {
                Some(Ok(multipart)) => AppError::Multipart(*multipart),
                _ => AppError::Unhandled(format!("upload into {path:?} failed")),
            }
        }
        other => other,
    }
}

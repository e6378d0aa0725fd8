use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use futures::AsyncBufRead;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio_util::compat::TokioAsyncWriteCompatExt;
use uuid::Uuid;

use crate::error::{AppError, FsOp, IoContext, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Folder,
}

impl EntryKind {
    /// Parses the `type` field of a delete request. Absent means a file.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "folder" => Ok(EntryKind::Folder),
            "file" | "" => Ok(EntryKind::File),
            other => Err(AppError::InvalidRequest(format!(
                "type must be \"file\" or \"folder\", got {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub sanitize_filenames: bool,
    pub overwrite: bool,
    pub max_upload_bytes: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            sanitize_filenames: false,
            overwrite: true,
            max_upload_bytes: 512 * 1024 * 1024,
        }
    }
}

impl UploadPolicy {
    /// The name a file is stored under, given what the client sent.
    fn stored_name(&self, original: &str) -> Result<String> {
        let name = if self.sanitize_filenames {
            Path::new(original)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
        } else {
            original
        };
        if name.is_empty() {
            return Err(AppError::MissingField("file"));
        }
        Ok(name.to_owned())
    }
}

/// Every managed file and folder lives under `root`. Paths coming from
/// clients are always resolved through [`LocalStorage::resolve`].
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    policy: UploadPolicy,
}

impl LocalStorage {
    /// Creates the root if needed. The root is kept canonical so that
    /// containment checks are plain prefix comparisons.
    pub async fn init<P>(root: P, policy: UploadPolicy) -> Result<Self>
    where
        P: Into<PathBuf>,
    {
        let root = root.into();
        fs::create_dir_all(&root).await.io_context(FsOp::Create, &root)?;
        let root = fs::canonicalize(&root).await.io_context(FsOp::Read, &root)?;
        Ok(Self { root, policy })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Joins the segments onto the root. `..` may not climb above the root,
    /// and the deepest part of the result that already exists must still be
    /// under the root once symlinks are followed.
    pub async fn resolve(&self, segments: &[&str]) -> Result<PathBuf> {
        let requested = segments.join("/");
        let outside = || AppError::InvalidPath(requested.clone());

        let mut resolved = self.root.clone();
        let mut depth = 0usize;
        for segment in segments {
            for component in Path::new(segment).components() {
                match component {
                    Component::Normal(part) => {
                        resolved.push(part);
                        depth += 1;
                    }
                    // "/docs" means docs under the root, like a path join would
                    Component::CurDir | Component::RootDir => {}
                    Component::ParentDir => {
                        if depth == 0 {
                            return Err(outside());
                        }
                        resolved.pop();
                        depth -= 1;
                    }
                    Component::Prefix(_) => return Err(outside()),
                }
            }
        }

        let mut existing = resolved.as_path();
        loop {
            match fs::canonicalize(existing).await {
                Ok(real) if real.starts_with(&self.root) => break,
                Ok(real) => {
                    tracing::warn!("{requested:?} resolves outside the storage root to {real:?}");
                    return Err(outside());
                }
                Err(_) => {
                    // there but not canonicalisable: a dangling symlink
                    if exists(existing).await {
                        tracing::warn!("{requested:?} goes through a dangling link {existing:?}");
                        return Err(outside());
                    }
                    match existing.parent() {
                        Some(parent) if existing != self.root.as_path() => existing = parent,
                        _ => return Err(outside()),
                    }
                }
            }
        }

        Ok(resolved)
    }

    pub async fn list(&self, relative: &str) -> Result<Vec<Entry>> {
        let dir = self.resolve(&[relative]).await?;
        if !exists(&dir).await {
            return Err(AppError::FolderNotFound(relative.to_owned()));
        }

        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(&dir).await.io_context(FsOp::Read, &dir)?;
        while let Some(dir_entry) = read_dir.next_entry().await.io_context(FsOp::Read, &dir)? {
            let path = dir_entry.path();
            // follow symlinks, a link to a folder is listed as a folder
            let meta = fs::metadata(&path).await.io_context(FsOp::Read, &path)?;
            entries.push(Entry {
                name: dir_entry.file_name().to_string_lossy().into_owned(),
                kind: if meta.is_dir() {
                    EntryKind::Folder
                } else {
                    EntryKind::File
                },
            });
        }
        Ok(entries)
    }

    pub async fn create_folder(&self, relative: &str, folder_name: &str) -> Result<PathBuf> {
        if folder_name.is_empty() {
            return Err(AppError::MissingField("folderName"));
        }
        let target = self.resolve(&[relative, folder_name]).await?;
        if exists(&target).await {
            return Err(AppError::AlreadyExists(folder_name.to_owned()));
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .io_context(FsOp::Create, parent)?;
        }
        match fs::create_dir(&target).await {
            Ok(()) => Ok(target),
            // lost a race against another request creating the same folder
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                Err(AppError::AlreadyExists(folder_name.to_owned()))
            }
            Err(err) => Err(err).io_context(FsOp::Create, &target),
        }
    }

    /// Writes `content` to `relative/file_name`, creating the directories on
    /// the way. Returns the stored name and the number of bytes written.
    pub async fn upload<R>(
        &self,
        relative: &str,
        file_name: &str,
        content: R,
    ) -> Result<(String, u64)>
    where
        R: AsyncBufRead + Unpin,
    {
        let stored_name = self.policy.stored_name(file_name)?;
        let dir = self.resolve(&[relative]).await?;
        fs::create_dir_all(&dir).await.io_context(FsOp::Upload, &dir)?;
        let target = self.resolve(&[relative, stored_name.as_str()]).await?;

        // Overwrites go through a sibling temp file renamed into place, so a
        // failed upload leaves the previous content alone.
        let written = if self.policy.overwrite {
            let leaf = target.file_name().unwrap_or_default().to_string_lossy();
            target.with_file_name(format!(".{leaf}.{}.part", Uuid::new_v4()))
        } else {
            target.clone()
        };
        let file = match OpenOptions::new().write(true).create_new(true).open(&written).await {
            Ok(f) => f,
            Err(err) if err.kind() == ErrorKind::AlreadyExists && !self.policy.overwrite => {
                return Err(AppError::AlreadyExists(stored_name));
            }
            Err(err) => return Err(err).io_context(FsOp::Upload, &target),
        };

        let mut writer = file.compat_write();
        let copied = match futures::io::copy_buf(content, &mut writer).await {
            Ok(bytes) => writer.into_inner().sync_all().await.map(|()| bytes),
            Err(err) => {
                drop(writer);
                Err(err)
            }
        };
        let bytes = match copied {
            Ok(bytes) if written == target => bytes,
            Ok(bytes) => match fs::rename(&written, &target).await {
                Ok(()) => bytes,
                Err(err) => {
                    discard(&written).await;
                    return Err(err).io_context(FsOp::Upload, &target);
                }
            },
            Err(err) => {
                discard(&written).await;
                return Err(err).io_context(FsOp::Upload, &target);
            }
        };
        Ok((stored_name, bytes))
    }

    pub async fn delete(&self, relative: &str, name: &str, kind: EntryKind) -> Result<()> {
        if name.is_empty() {
            return Err(AppError::MissingField("name"));
        }
        let target = self.resolve(&[relative, name]).await?;
        if target == self.root {
            return Err(AppError::InvalidPath(format!("{relative}/{name}")));
        }
        if !exists(&target).await {
            return Err(AppError::ItemNotFound(name.to_owned()));
        }

        let removed = match kind {
            EntryKind::Folder => fs::remove_dir_all(&target).await,
            EntryKind::File => fs::remove_file(&target).await,
        };
        removed.io_context(FsOp::Delete, &target)
    }
}

async fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).await.is_ok()
}

/// Removes a partially written upload.
async fn discard(path: &Path) {
    if let Err(err) = fs::remove_file(path).await {
        tracing::warn!("Cannot remove partial upload {path:?}: {err}");
    }
}

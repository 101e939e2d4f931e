use crate::core::probe::{Executor, Probe, ProbeStatus, Resource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A regular file with exact content and, optionally, exact permission bits.
///
/// Content is an opaque payload supplied by the caller.
#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
    content: Vec<u8>,
    mode: Option<u32>,
}

impl File {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            mode: None,
        }
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }
}

#[async_trait]
impl Probe for File {
    async fn check(&self) -> Result<ProbeStatus> {
        let current = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(ProbeStatus::unsatisfied(format!(
                    "{} does not exist",
                    self.path.display()
                )));
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()));
            }
        };

        if current != self.content {
            return Ok(ProbeStatus::unsatisfied(format!(
                "{} content differs (sha256 {} != {})",
                self.path.display(),
                short_digest(&current),
                short_digest(&self.content)
            )));
        }

        mode_status(&self.path, self.mode).await
    }
}

#[async_trait]
impl Executor for File {
    async fn apply(&self) -> Result<()> {
        write_atomic(&self.path, &self.content, self.mode).await
    }
}

impl Resource for File {
    fn describe(&self) -> String {
        format!("file {} up to date", self.path.display())
    }
}

/// A directory that must exist, with optional permission bits.
#[derive(Debug, Clone)]
pub struct Directory {
    path: PathBuf,
    mode: Option<u32>,
}

impl Directory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mode: None,
        }
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }
}

#[async_trait]
impl Probe for Directory {
    async fn check(&self) -> Result<ProbeStatus> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) if meta.is_dir() => mode_status(&self.path, self.mode).await,
            Ok(_) => Ok(ProbeStatus::unsatisfied(format!(
                "{} exists but is not a directory",
                self.path.display()
            ))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(ProbeStatus::unsatisfied(
                format!("{} does not exist", self.path.display()),
            )),
            Err(e) => Err(e).with_context(|| format!("Failed to stat {}", self.path.display())),
        }
    }
}

#[async_trait]
impl Executor for Directory {
    async fn apply(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.path)
            .await
            .with_context(|| format!("Failed to create {}", self.path.display()))?;
        if let Some(mode) = self.mode {
            set_mode(&self.path, mode).await?;
        }
        Ok(())
    }
}

impl Resource for Directory {
    fn describe(&self) -> String {
        format!("directory {} present", self.path.display())
    }
}

/// A symbolic link at `path` pointing to `target`.
#[derive(Debug, Clone)]
pub struct Symlink {
    path: PathBuf,
    target: PathBuf,
}

impl Symlink {
    pub fn new(path: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            target: target.into(),
        }
    }
}

#[async_trait]
impl Probe for Symlink {
    async fn check(&self) -> Result<ProbeStatus> {
        match tokio::fs::read_link(&self.path).await {
            Ok(current) if current == self.target => Ok(ProbeStatus::Satisfied),
            Ok(current) => Ok(ProbeStatus::unsatisfied(format!(
                "{} points to {}",
                self.path.display(),
                current.display()
            ))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(ProbeStatus::unsatisfied(
                format!("{} does not exist", self.path.display()),
            )),
            // EINVAL: the path exists but is not a symlink.
            Err(e) if e.kind() == ErrorKind::InvalidInput => Ok(ProbeStatus::unsatisfied(
                format!("{} is not a symlink", self.path.display()),
            )),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read link {}", self.path.display()))
            }
        }
    }
}

#[async_trait]
impl Executor for Symlink {
    async fn apply(&self) -> Result<()> {
        match tokio::fs::symlink_metadata(&self.path).await {
            Ok(meta) if meta.is_dir() => anyhow::bail!(
                "{} is a directory; refusing to replace it with a symlink",
                self.path.display()
            ),
            Ok(_) => tokio::fs::remove_file(&self.path)
                .await
                .with_context(|| format!("Failed to remove {}", self.path.display()))?,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to stat {}", self.path.display()));
            }
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        create_symlink(&self.target, &self.path).await
    }
}

impl Resource for Symlink {
    fn describe(&self) -> String {
        format!(
            "symlink {} -> {}",
            self.path.display(),
            self.target.display()
        )
    }
}

/// A `KEY=value` environment file, written with owner-only permissions.
#[derive(Debug, Clone)]
pub struct EnvFile {
    inner: File,
}

impl EnvFile {
    pub fn new(path: impl Into<PathBuf>, vars: &BTreeMap<String, String>) -> Result<Self> {
        Ok(Self {
            inner: File::new(path, render_env_file(vars)?).mode(0o600),
        })
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.inner = self.inner.mode(mode);
        self
    }
}

#[async_trait]
impl Probe for EnvFile {
    async fn check(&self) -> Result<ProbeStatus> {
        self.inner.check().await
    }
}

#[async_trait]
impl Executor for EnvFile {
    async fn apply(&self) -> Result<()> {
        self.inner.apply().await
    }
}

impl Resource for EnvFile {
    fn describe(&self) -> String {
        format!("environment file {} up to date", self.inner.path.display())
    }
}

/// Renders sorted `KEY=value` lines. Values with shell-significant characters
/// are double-quoted with `\` and `"` escaped.
pub fn render_env_file(vars: &BTreeMap<String, String>) -> Result<String> {
    let mut out = String::new();
    for (key, value) in vars {
        let valid_key = key
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_key {
            anyhow::bail!("invalid environment variable name: {key:?}");
        }
        if value.contains('\n') {
            anyhow::bail!("value for {key} must not contain a newline");
        }

        let plain = value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-.,:/@+%=".contains(c));
        if plain {
            out.push_str(&format!("{key}={value}\n"));
        } else {
            let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
            out.push_str(&format!("{key}=\"{escaped}\"\n"));
        }
    }
    Ok(out)
}

fn short_digest(bytes: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(bytes));
    digest[..12].to_string()
}

/// Writes via a sibling temp file and rename so readers never see a partial file.
async fn write_atomic(path: &Path, content: &[u8], mode: Option<u32>) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(parent)
        .await
        .with_context(|| format!("Failed to create {}", parent.display()))?;

    let file_name = path
        .file_name()
        .with_context(|| format!("{} has no file name", path.display()))?;
    let tmp = parent.join(format!(
        ".{}.hostconverge-{}",
        file_name.to_string_lossy(),
        uuid::Uuid::new_v4().simple()
    ));

    tokio::fs::write(&tmp, content)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    let permissions = match mode {
        Some(mode) => set_mode(&tmp, mode).await,
        None => keep_permissions(path, &tmp).await,
    };
    if let Err(e) = permissions {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e).with_context(|| format!("Failed to replace {}", path.display()));
    }
    Ok(())
}

/// Carries the replaced file's permissions over to `tmp`. A new file keeps
/// the umask default.
async fn keep_permissions(path: &Path, tmp: &Path) -> Result<()> {
    let permissions = match tokio::fs::metadata(path).await {
        Ok(meta) => meta.permissions(),
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).with_context(|| format!("Failed to stat {}", path.display())),
    };
    tokio::fs::set_permissions(tmp, permissions)
        .await
        .with_context(|| format!("Failed to chmod {}", tmp.display()))
}

#[cfg(unix)]
async fn mode_status(path: &Path, desired: Option<u32>) -> Result<ProbeStatus> {
    use std::os::unix::fs::PermissionsExt;

    let Some(desired) = desired else {
        return Ok(ProbeStatus::Satisfied);
    };
    let meta = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    let current = meta.permissions().mode() & 0o7777;
    if current == desired {
        Ok(ProbeStatus::Satisfied)
    } else {
        Ok(ProbeStatus::unsatisfied(format!(
            "{} has mode {current:04o}, want {desired:04o}",
            path.display()
        )))
    }
}

#[cfg(not(unix))]
async fn mode_status(_path: &Path, _desired: Option<u32>) -> Result<ProbeStatus> {
    Ok(ProbeStatus::Satisfied)
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .with_context(|| format!("Failed to chmod {}", path.display()))
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
async fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    tokio::fs::symlink(target, link)
        .await
        .with_context(|| format!("Failed to link {} -> {}", link.display(), target.display()))
}

#[cfg(not(unix))]
async fn create_symlink(_target: &Path, link: &Path) -> Result<()> {
    anyhow::bail!("symlinks are only supported on unix ({})", link.display())
}

//! Ephemeral working directories for compose and stack files

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use crate::errors::AgentError;

/// Fallback project name when a deployment id has no usable characters
const DEFAULT_PROJECT: &str = "deployment";

/// Derive an engine-safe project name from a deployment id.
///
/// `deployment/3F2a-..` becomes `3f2a-..`: lowercase alphanumerics, `-` and
/// `_`, starting with an alphanumeric.
pub fn project_name(deployment_id: &str) -> String {
    let raw = deployment_id.rsplit('/').next().unwrap_or(deployment_id);
    let sanitized: String = raw
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let trimmed = sanitized.trim_start_matches(|c: char| !c.is_ascii_alphanumeric());

    if trimmed.is_empty() {
        DEFAULT_PROJECT.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Working directory for one project, removed after use
#[derive(Debug)]
pub struct StagingDir {
    path: PathBuf,
    removed: bool,
}

impl StagingDir {
    /// Create a fresh directory `<root>/<project>-<unique>`.
    ///
    /// Every call gets its own directory, concurrent jobs on one project never
    /// share files.
    pub async fn create(root: &Path, project: &str) -> Result<Self, AgentError> {
        let path = root.join(format!("{}-{}", project, uuid::Uuid::new_v4().simple()));
        fs::create_dir_all(&path).await?;
        debug!("Staging directory {}", path.display());

        Ok(Self {
            path,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a file relative to the staging directory
    pub async fn write_file(&self, name: &str, contents: &str) -> Result<PathBuf, AgentError> {
        let relative = Path::new(name);
        let is_safe = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !is_safe {
            return Err(AgentError::DeployError(format!(
                "refusing to stage file outside the working directory: {}",
                name
            )));
        }

        let target = self.path.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target, contents).await?;
        Ok(target)
    }

    /// Remove the directory and everything in it
    pub async fn remove(mut self) -> Result<(), AgentError> {
        self.removed = true;
        match fs::remove_dir_all(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if !self.removed {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove staging directory {}: {}", self.path.display(), e);
                }
            }
        }
    }
}

fn is_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Resolve the inside of a `${...}` placeholder, `None` for unsupported forms.
///
/// Defaults are expanded themselves, so `${A:-${B:-x}}` falls through to `B`.
fn resolve_placeholder(inner: &str, env: &HashMap<String, String>) -> Option<String> {
    let name_len = inner
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(inner.len());
    let (name, op) = inner.split_at(name_len);
    if !is_var_name(name) {
        return None;
    }

    if op.is_empty() {
        return Some(env.get(name).cloned().unwrap_or_default());
    }
    if let Some(default) = op.strip_prefix(":-") {
        return Some(match env.get(name) {
            Some(value) if !value.is_empty() => value.clone(),
            _ => expand_env(default, env),
        });
    }
    if let Some(default) = op.strip_prefix('-') {
        return Some(
            env.get(name)
                .cloned()
                .unwrap_or_else(|| expand_env(default, env)),
        );
    }

    None
}

/// Offset of the `}` closing a placeholder body, nested `${...}` included
fn closing_brace(body: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                depth += 1;
                i += 2;
                continue;
            }
            b'}' if depth == 0 => return Some(i),
            b'}' => depth -= 1,
            _ => {}
        }
        i += 1;
    }
    None
}

/// Expand `${VAR}`, `${VAR:-default}` and `${VAR-default}` placeholders.
///
/// Unset variables without a default expand to an empty string. `$$`
/// escapes, bare `$VAR` and unsupported forms are left untouched.
pub fn expand_env(text: &str, env: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("$$") {
            out.push_str("$$");
            rest = &tail[2..];
            continue;
        }

        if let Some(body) = tail.strip_prefix("${") {
            if let Some(end) = closing_brace(body) {
                let inner = &body[..end];
                match resolve_placeholder(inner, env) {
                    Some(value) => out.push_str(&value),
                    None => out.push_str(&tail[..end + 3]),
                }
                rest = &body[end + 1..];
                continue;
            }
        }

        out.push('$');
        rest = &tail[1..];
    }

    out.push_str(rest);
    out
}

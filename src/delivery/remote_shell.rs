//! Typed command channel to the remote music host.
//!
//! Each remote operation the packager needs is a distinct method that
//! builds its own command line and quotes every path word itself; user
//! strings never leak into a shell word unquoted. Every invocation is
//! bounded by the configured timeout.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::RemoteSettings;

use super::error::DeliveryError;

/// Errors raised by the remote shell channel.
#[derive(Debug, Error)]
pub enum RemoteShellError {
    #[error("cannot reach {host}: {detail}")]
    Unreachable { host: String, detail: String },

    #[error("authentication to {host} failed: {detail}")]
    AuthFailed { host: String, detail: String },

    #[error("remote command exceeded {0}s timeout")]
    Timeout(u64),

    #[error("remote command failed (exit {code}): {stderr}")]
    CommandFailed { code: i32, stderr: String },

    #[error("path cannot be shell-quoted: {0}")]
    Unquotable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<RemoteShellError> for DeliveryError {
    fn from(e: RemoteShellError) -> Self {
        match e {
            RemoteShellError::Unreachable { .. } => DeliveryError::RemoteUnreachable(e.to_string()),
            RemoteShellError::AuthFailed { .. } => DeliveryError::RemoteAuthFailed(e.to_string()),
            RemoteShellError::Timeout(secs) => DeliveryError::RemoteTimeout(secs),
            RemoteShellError::CommandFailed { .. } | RemoteShellError::Unquotable(_) => {
                DeliveryError::RemoteCommandFailed(e.to_string())
            }
            RemoteShellError::Io(e) => DeliveryError::Io(e),
        }
    }
}

pub struct RemoteShell {
    host: String,
    key_path: Option<PathBuf>,
    timeout: Duration,
}

impl RemoteShell {
    pub fn new(settings: &RemoteSettings) -> Self {
        Self {
            host: settings.host.clone(),
            key_path: settings.key_path.clone(),
            timeout: Duration::from_secs(settings.timeout_seconds),
        }
    }

    /// Check whether `path` is a directory on the remote host.
    ///
    /// A plain `test -d` miss is a regular `false`; channel failures
    /// still propagate.
    pub async fn test_dir(&self, path: &str) -> Result<bool, RemoteShellError> {
        match self.exec(&test_dir_command(path)?).await {
            Ok(_) => Ok(true),
            Err(RemoteShellError::CommandFailed { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn make_dir(&self, path: &str) -> Result<(), RemoteShellError> {
        self.exec(&make_dir_command(path)?).await.map(drop)
    }

    pub async fn remove_tree(&self, path: &str) -> Result<(), RemoteShellError> {
        self.exec(&remove_tree_command(path)?).await.map(drop)
    }

    /// Recursively copy the contents of `source` into `scratch`.
    pub async fn stage(&self, source: &str, scratch: &str) -> Result<(), RemoteShellError> {
        self.exec(&stage_command(source, scratch)?).await.map(drop)
    }

    /// Tar+gzip `dir_name` (relative to `parent`) on the remote host and
    /// stream the archive bytes straight into `dest`. Returns the number
    /// of bytes written.
    pub async fn archive_to_file(
        &self,
        parent: &str,
        dir_name: &str,
        dest: &Path,
    ) -> Result<u64, RemoteShellError> {
        let command = archive_command(parent, dir_name)?;
        let mut cmd = self.base_command();
        cmd.arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn()?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("child stdout not captured"))?;
        let mut file = tokio::fs::File::create(dest).await?;

        // On timeout the future is dropped and kill_on_drop reaps the ssh
        let streamed = tokio::time::timeout(self.timeout, async move {
            let copied = tokio::io::copy(&mut stdout, &mut file).await?;
            file.flush().await?;
            let output = child.wait_with_output().await?;
            Ok::<_, std::io::Error>((copied, output))
        })
        .await;

        match streamed {
            Err(_) => Err(RemoteShellError::Timeout(self.timeout.as_secs())),
            Ok(Err(e)) => Err(RemoteShellError::Io(e)),
            Ok(Ok((copied, output))) => {
                if output.status.success() {
                    Ok(copied)
                } else {
                    Err(classify_failure(
                        &self.host,
                        output.status.code().unwrap_or(-1),
                        &String::from_utf8_lossy(&output.stderr),
                    ))
                }
            }
        }
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o").arg("BatchMode=yes");
        if let Some(key) = &self.key_path {
            cmd.arg("-i").arg(key);
        }
        cmd.arg(&self.host);
        cmd.kill_on_drop(true);
        cmd
    }

    async fn exec(&self, command: &str) -> Result<std::process::Output, RemoteShellError> {
        let mut cmd = self.base_command();
        cmd.arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| RemoteShellError::Timeout(self.timeout.as_secs()))?
            .map_err(RemoteShellError::Io)?;

        if output.status.success() {
            Ok(output)
        } else {
            Err(classify_failure(
                &self.host,
                output.status.code().unwrap_or(-1),
                &String::from_utf8_lossy(&output.stderr),
            ))
        }
    }
}

/// Sort a non-zero ssh exit into a channel failure class.
///
/// ssh itself exits 255 on connection and authentication problems; the
/// stderr text tells them apart. Anything else is the remote command's
/// own exit status.
fn classify_failure(host: &str, code: i32, stderr: &str) -> RemoteShellError {
    let detail = stderr.trim().to_string();
    let lower = detail.to_lowercase();
    if lower.contains("permission denied")
        || lower.contains("authentication failed")
        || lower.contains("host key verification failed")
    {
        return RemoteShellError::AuthFailed {
            host: host.to_string(),
            detail,
        };
    }
    if code == 255
        || lower.contains("connection refused")
        || lower.contains("connection timed out")
        || lower.contains("could not resolve hostname")
        || lower.contains("no route to host")
    {
        return RemoteShellError::Unreachable {
            host: host.to_string(),
            detail,
        };
    }
    RemoteShellError::CommandFailed {
        code,
        stderr: detail,
    }
}

fn quote(word: &str) -> Result<String, RemoteShellError> {
    shlex::try_quote(word)
        .map(|q| q.into_owned())
        .map_err(|_| RemoteShellError::Unquotable(word.to_string()))
}

fn test_dir_command(path: &str) -> Result<String, RemoteShellError> {
    Ok(format!("test -d {}", quote(path)?))
}

fn make_dir_command(path: &str) -> Result<String, RemoteShellError> {
    Ok(format!("mkdir -p {}", quote(path)?))
}

fn remove_tree_command(path: &str) -> Result<String, RemoteShellError> {
    Ok(format!("rm -rf {}", quote(path)?))
}

fn stage_command(source: &str, scratch: &str) -> Result<String, RemoteShellError> {
    // The /. suffix copies the directory's contents, not the directory
    Ok(format!(
        "cp -R {} {}",
        quote(&format!("{}/.", source))?,
        quote(scratch)?
    ))
}

fn archive_command(parent: &str, dir_name: &str) -> Result<String, RemoteShellError> {
    Ok(format!(
        "cd {} && tar -czf - {}",
        quote(parent)?,
        quote(dir_name)?
    ))
}

use std::path::{Path, PathBuf};
use std::process::Command;

use camino::Utf8Path;

use crate::config::SshSettings;
use crate::delivery::{DeliveryChannel, file_name};
use crate::error::SourcingError;

const PASSWORD_ENV: &str = "SSHPASS";

/// Picks the remote-copy strategy once, at startup.
pub struct RemoteCopy;

impl RemoteCopy {
    pub fn detect(settings: SshSettings) -> Box<dyn DeliveryChannel> {
        match (find_in_path("sshpass"), find_in_path("scp")) {
            (Some(sshpass), Some(_)) => Box::new(ScpChannel::new(settings, sshpass)),
            (sshpass, scp) => {
                let missing = [("sshpass", sshpass.is_none()), ("scp", scp.is_none())]
                    .iter()
                    .filter(|(_, missing)| *missing)
                    .map(|(name, _)| *name)
                    .collect::<Vec<_>>()
                    .join(", ");
                tracing::warn!(missing = %missing, "remote copy utilities not found, remote copy disabled");
                Box::new(SkipRemoteCopy)
            }
        }
    }
}

/// `sshpass -e scp -P <port> <file> <user>@<host>:<dir>/<name>`, the password
/// passed through `SSHPASS` so it never shows up in the process list.
#[derive(Debug, Clone)]
pub struct ScpChannel {
    settings: SshSettings,
    sshpass: PathBuf,
}

impl ScpChannel {
    pub fn new(settings: SshSettings, sshpass: PathBuf) -> Self {
        Self { settings, sshpass }
    }

    pub fn destination(&self, path: &Utf8Path) -> Result<String, SourcingError> {
        let name = file_name(path)?;
        let dir = self.settings.remote_dir.trim_end_matches('/');
        Ok(format!(
            "{}@{}:{dir}/{name}",
            self.settings.user, self.settings.host
        ))
    }

    pub fn args(&self, path: &Utf8Path) -> Result<Vec<String>, SourcingError> {
        Ok(vec![
            "-e".to_string(),
            "scp".to_string(),
            "-P".to_string(),
            self.settings.port.to_string(),
            path.to_string(),
            self.destination(path)?,
        ])
    }

    fn run(&self, program: &Path, args: &[String]) -> Result<(), SourcingError> {
        let output = Command::new(program)
            .args(args)
            .env(PASSWORD_ENV, &self.settings.password)
            .output()
            .map_err(|err| SourcingError::RemoteCopy(err.to_string()))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("scp exited with {}", output.status)
        } else {
            stderr
        };
        Err(SourcingError::RemoteCopy(message))
    }
}

impl DeliveryChannel for ScpChannel {
    fn name(&self) -> &str {
        "scp"
    }

    fn deliver(&self, path: &Utf8Path) -> Result<(), SourcingError> {
        let destination = self.destination(path)?;
        tracing::info!(file = %path, destination = %destination, "copying over scp");
        let args = self.args(path)?;
        self.run(&self.sshpass, &args)
    }
}

/// Stand-in used when the copy utilities are absent on this host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipRemoteCopy;

impl DeliveryChannel for SkipRemoteCopy {
    fn name(&self) -> &str {
        "scp-skipped"
    }

    fn deliver(&self, path: &Utf8Path) -> Result<(), SourcingError> {
        tracing::warn!(file = %path, "remote copy unavailable, skipping");
        Ok(())
    }
}

fn find_in_path(program: &str) -> Option<PathBuf> {
    let candidates = [program.to_string(), format!("{program}.exe")];
    std::env::split_paths(&std::env::var_os("PATH")?)
        .flat_map(|dir| candidates.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}

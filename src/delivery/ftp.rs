use std::fs::File;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use camino::Utf8Path;
use suppaftp::FtpStream;
use suppaftp::types::FileType;

use crate::config::FtpSettings;
use crate::delivery::{DeliveryChannel, file_name};
use crate::error::SourcingError;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Binary STOR of the output file over plain FTP, one connection per call.
#[derive(Debug, Clone)]
pub struct FtpChannel {
    settings: FtpSettings,
}

impl FtpChannel {
    pub fn new(settings: FtpSettings) -> Self {
        Self { settings }
    }

    pub fn remote_name(&self, path: &Utf8Path) -> Result<String, SourcingError> {
        let name = file_name(path)?;
        Ok(match self.settings.remote_dir.as_deref() {
            Some(dir) if !dir.trim().is_empty() => {
                format!("{}/{name}", dir.trim_end_matches('/'))
            }
            _ => name.to_string(),
        })
    }

    pub fn addresses(&self) -> Result<Vec<SocketAddr>, SourcingError> {
        let addrs = (self.settings.host.as_str(), self.settings.port)
            .to_socket_addrs()
            .map_err(|err| SourcingError::Transfer(format!("resolve {}: {err}", self.settings.host)))?
            .collect::<Vec<_>>();
        if addrs.is_empty() {
            return Err(SourcingError::Transfer(format!(
                "resolve {}: no addresses",
                self.settings.host
            )));
        }
        Ok(addrs)
    }

    /// Tries each resolved address in turn, bounded by [`CONNECT_TIMEOUT`].
    fn connect(&self) -> Result<FtpStream, SourcingError> {
        let mut last_error = None;
        for addr in self.addresses()? {
            match FtpStream::connect_timeout(addr, CONNECT_TIMEOUT) {
                Ok(stream) => return Ok(stream),
                Err(err) => last_error = Some(format!("{addr}: {err}")),
            }
        }
        Err(SourcingError::Transfer(format!(
            "connect: {}",
            last_error.unwrap_or_else(|| "no address reachable".to_string())
        )))
    }
}

impl DeliveryChannel for FtpChannel {
    fn name(&self) -> &str {
        "ftp"
    }

    fn deliver(&self, path: &Utf8Path) -> Result<(), SourcingError> {
        let remote = self.remote_name(path)?;
        let mut file = File::open(path.as_std_path())
            .map_err(|err| SourcingError::Filesystem(format!("open {path}: {err}")))?;

        let mut ftp = self.connect()?;
        ftp.login(self.settings.user.as_str(), self.settings.password.as_str())
            .map_err(|err| SourcingError::Transfer(format!("login: {err}")))?;
        ftp.transfer_type(FileType::Binary)
            .map_err(|err| SourcingError::Transfer(format!("binary mode: {err}")))?;
        let bytes = ftp
            .put_file(remote.as_str(), &mut file)
            .map_err(|err| SourcingError::Transfer(format!("STOR {remote}: {err}")))?;
        ftp.quit()
            .map_err(|err| SourcingError::Transfer(format!("quit: {err}")))?;

        tracing::debug!(remote = %remote, bytes, "ftp upload complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(remote_dir: Option<&str>) -> FtpSettings {
        FtpSettings {
            host: "ftp.example.test".to_string(),
            port: 21,
            user: "upload".to_string(),
            password: "secret".to_string(),
            remote_dir: remote_dir.map(str::to_string),
        }
    }

    #[test]
    fn refused_connection_is_transfer_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut closed = settings(None);
        closed.host = "127.0.0.1".to_string();
        closed.port = port;
        let err = FtpChannel::new(closed).connect().err().unwrap();
        assert!(matches!(err, SourcingError::Transfer(message) if message.starts_with("connect:")));
    }

    #[test]
    fn remote_name_uses_base_name() {
        let channel = FtpChannel::new(settings(None));
        let name = channel
            .remote_name(Utf8Path::new("uploads/parts_response.xlsx"))
            .unwrap();
        assert_eq!(name, "parts_response.xlsx");
    }

    #[test]
    fn remote_name_under_fixed_directory() {
        let channel = FtpChannel::new(settings(Some("/inbox/")));
        let name = channel
            .remote_name(Utf8Path::new("uploads/parts_response.xlsx"))
            .unwrap();
        assert_eq!(name, "/inbox/parts_response.xlsx");
    }
}

//! FTP upload of finished files

use async_trait::async_trait;
use std::fs::File;
use std::io::{Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use suppaftp::types::FileType;
use suppaftp::{FtpStream, Mode};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::spawn_blocking;
use tracing::debug;

use super::traits::FileUploader;
use crate::config::UploadConfig;
use crate::error::{Error, Result, TransferError};
use crate::settings::FtpSettings;

/// Uploads files over FTP with the blocking suppaftp client on the blocking pool
pub struct FtpUploader {
    settings: FtpSettings,
    config: UploadConfig,
}

impl FtpUploader {
    /// Create an uploader
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::IncompleteConfig`] when host or user is missing.
    pub fn new(settings: FtpSettings, config: UploadConfig) -> Result<Self> {
        if !settings.is_complete() {
            return Err(Error::Transfer(TransferError::IncompleteConfig(
                "FTP host and username are required".to_string(),
            )));
        }
        Ok(Self { settings, config })
    }

    /// Remote path a file with this basename is stored under
    pub fn remote_path(&self, file_name: &str) -> String {
        let dir = self.settings.remote_dir.trim().trim_end_matches('/');
        if dir.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", dir, file_name)
        }
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&FtpSettings, &UploadConfig) -> Result<T> + Send + 'static,
    {
        let settings = self.settings.clone();
        let config = self.config.clone();
        spawn_blocking(move || op(&settings, &config))
            .await
            .map_err(|e| {
                Error::Transfer(TransferError::Upload(format!("upload task panicked: {}", e)))
            })?
    }
}

#[async_trait]
impl FileUploader for FtpUploader {
    async fn upload(&self, local: &Path, progress: Option<UnboundedSender<u8>>) -> Result<String> {
        let file_name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::Transfer(TransferError::Upload(format!(
                    "not a file path: {}",
                    local.display()
                )))
            })?;
        let remote_path = self.remote_path(&file_name);
        let local = local.to_path_buf();

        self.run_blocking(move |settings, config| {
            let mut ftp = connect(settings, config)?;
            let result = store_file(&mut ftp, settings, config, &local, &file_name, progress);
            let _ = ftp.quit();
            result
        })
        .await?;

        Ok(remote_path)
    }

    async fn check_connection(&self) -> Result<()> {
        self.run_blocking(|settings, config| {
            let mut ftp = connect(settings, config)?;
            let result = ensure_remote_dir(&mut ftp, &settings.remote_dir);
            let _ = ftp.quit();
            result
        })
        .await
    }

    fn name(&self) -> &'static str {
        "ftp"
    }
}

fn upload_err(context: &str, e: impl std::fmt::Display) -> Error {
    Error::Transfer(TransferError::Upload(format!("{}: {}", context, e)))
}

fn resolve(settings: &FtpSettings) -> Result<SocketAddr> {
    (settings.host.as_str(), settings.port)
        .to_socket_addrs()
        .map_err(|e| upload_err(&format!("cannot resolve {}", settings.host), e))?
        .next()
        .ok_or_else(|| {
            Error::Transfer(TransferError::Upload(format!(
                "no address for {}",
                settings.host
            )))
        })
}

/// Connect, log in and switch to binary mode with the configured data mode
fn connect(settings: &FtpSettings, config: &UploadConfig) -> Result<FtpStream> {
    let addr = resolve(settings)?;
    let mut ftp = FtpStream::connect_timeout(addr, config.connect_timeout)
        .map_err(|e| upload_err(&format!("connect to {} failed", addr), e))?;

    ftp.login(settings.username.as_str(), settings.password.as_str())
        .map_err(|e| upload_err("login failed", e))?;

    ftp.set_mode(if settings.passive_mode {
        Mode::Passive
    } else {
        Mode::Active
    });

    ftp.transfer_type(FileType::Binary)
        .map_err(|e| upload_err("cannot switch to binary mode", e))?;

    debug!(host = %settings.host, port = settings.port, "FTP session established");
    Ok(ftp)
}

/// Change into `dir`, creating each missing segment on the way
fn ensure_remote_dir(ftp: &mut FtpStream, dir: &str) -> Result<()> {
    let dir = dir.trim();
    if dir.is_empty() {
        return Ok(());
    }

    if dir.starts_with('/') {
        ftp.cwd("/").map_err(|e| upload_err("cannot change to /", e))?;
    }

    for segment in dir.split('/').filter(|s| !s.is_empty()) {
        if ftp.cwd(segment).is_err() {
            ftp.mkdir(segment)
                .map_err(|e| upload_err(&format!("cannot create directory {}", segment), e))?;
            ftp.cwd(segment)
                .map_err(|e| upload_err(&format!("cannot change to {}", segment), e))?;
        }
    }
    Ok(())
}

fn store_file(
    ftp: &mut FtpStream,
    settings: &FtpSettings,
    config: &UploadConfig,
    local: &Path,
    file_name: &str,
    progress: Option<UnboundedSender<u8>>,
) -> Result<()> {
    ensure_remote_dir(ftp, &settings.remote_dir)?;

    let mut file = File::open(local)
        .map_err(|e| upload_err(&format!("cannot open {}", local.display()), e))?;
    let total = file
        .metadata()
        .map_err(|e| upload_err(&format!("cannot stat {}", local.display()), e))?
        .len();

    let mut milestones = Milestones::new(total, progress);
    let mut stream = ftp
        .put_with_stream(file_name)
        .map_err(|e| upload_err("STOR rejected", e))?;

    let mut buf = vec![0u8; config.block_size.max(1)];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| upload_err(&format!("cannot read {}", local.display()), e))?;
        if n == 0 {
            break;
        }
        stream
            .write_all(&buf[..n])
            .map_err(|e| upload_err("data connection write failed", e))?;
        milestones.advance(n as u64);
    }

    ftp.finalize_put_stream(stream)
        .map_err(|e| upload_err("transfer not acknowledged", e))?;
    milestones.finish();
    Ok(())
}

/// Reports each crossed 10% step exactly once
struct Milestones {
    total: u64,
    sent: u64,
    last: u8,
    tx: Option<UnboundedSender<u8>>,
}

impl Milestones {
    fn new(total: u64, tx: Option<UnboundedSender<u8>>) -> Self {
        Self {
            total,
            sent: 0,
            last: 0,
            tx,
        }
    }

    fn advance(&mut self, bytes: u64) {
        self.sent += bytes;
        if self.total == 0 {
            return;
        }
        let percent = ((self.sent.min(self.total) * 100) / self.total) as u8;
        let step = percent / 10 * 10;
        while self.last < step {
            self.last += 10;
            if let Some(tx) = &self.tx {
                let _ = tx.send(self.last);
            }
        }
    }

    fn finish(&mut self) {
        if self.total == 0 && self.last < 100 {
            self.last = 100;
            if let Some(tx) = &self.tx {
                let _ = tx.send(100);
            }
        }
    }
}

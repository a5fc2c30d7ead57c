//! Traits and types for post-completion transfers

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

use crate::config::{RemoteConfig, UploadConfig};
use crate::settings::{Aria2Settings, FtpSettings};

/// Options attached to a remote push
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOptions {
    /// File name the remote downloader saves under
    pub out: String,
    /// Remote output directory (remote default when `None`)
    pub dir: Option<String>,
}

/// State of a job on the remote downloader
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteJobState {
    /// Transferring
    Active,
    /// Queued on the remote side
    Waiting,
    /// Paused on the remote side
    Paused,
    /// Finished successfully
    Complete,
    /// Finished with an error
    Error,
    /// Removed by the remote user
    Removed,
    /// A status string this client does not know
    Unknown(String),
}

impl RemoteJobState {
    /// Parse the remote status string
    pub fn parse(status: &str) -> Self {
        match status {
            "active" => RemoteJobState::Active,
            "waiting" => RemoteJobState::Waiting,
            "paused" => RemoteJobState::Paused,
            "complete" => RemoteJobState::Complete,
            "error" => RemoteJobState::Error,
            "removed" => RemoteJobState::Removed,
            other => RemoteJobState::Unknown(other.to_string()),
        }
    }

    /// Whether the job will not change state anymore
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            RemoteJobState::Complete | RemoteJobState::Error | RemoteJobState::Removed
        )
    }
}

/// Remote download agent that pulls finished files from this host
///
/// The production implementation is [`Aria2Client`](super::Aria2Client). Tests
/// substitute in-memory fakes.
#[async_trait]
pub trait RemoteDownloader: Send + Sync {
    /// Ask the remote side to fetch `uri`. Returns the remote job ID.
    async fn add_uri(&self, uri: &str, options: &PushOptions) -> crate::Result<String>;

    /// Query the state of a remote job
    async fn tell_status(&self, gid: &str) -> crate::Result<RemoteJobState>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Direct upload of a finished file to a file server
#[async_trait]
pub trait FileUploader: Send + Sync {
    /// Upload `local` under its basename. Percent milestones (10, 20, ..., 100)
    /// are sent on `progress` as they are crossed. Returns the remote path.
    async fn upload(
        &self,
        local: &Path,
        progress: Option<UnboundedSender<u8>>,
    ) -> crate::Result<String>;

    /// Connect, authenticate and make sure the remote directory exists
    async fn check_connection(&self) -> crate::Result<()>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Builds transfer backends from a fresh settings snapshot
pub trait TransferProvider: Send + Sync {
    /// Remote downloader for the given settings
    fn remote_downloader(
        &self,
        settings: &Aria2Settings,
        config: &RemoteConfig,
    ) -> crate::Result<Arc<dyn RemoteDownloader>>;

    /// File uploader for the given settings
    fn uploader(
        &self,
        settings: &FtpSettings,
        config: &UploadConfig,
    ) -> crate::Result<Arc<dyn FileUploader>>;
}

//! Post-completion transfer backends
//!
//! Finished files leave this host in one of two ways:
//!
//! - [`RemoteDownloader`]: a remote agent is told where to fetch the file
//!   ([`Aria2Client`], aria2 JSON-RPC over HTTP)
//! - [`FileUploader`]: the file is pushed to a server ([`FtpUploader`])
//!
//! Backends are built per use from the current settings through a
//! [`TransferProvider`]; [`DefaultTransferProvider`] builds the production ones.

mod aria2;
mod ftp;
mod traits;

use std::sync::Arc;

use crate::config::{RemoteConfig, UploadConfig};
use crate::settings::{Aria2Settings, FtpSettings};

pub use aria2::{Aria2Client, remote_file_url};
pub use ftp::FtpUploader;
pub use traits::{
    FileUploader, PushOptions, RemoteDownloader, RemoteJobState, TransferProvider,
};

/// Builds [`Aria2Client`] and [`FtpUploader`] instances
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTransferProvider;

impl TransferProvider for DefaultTransferProvider {
    fn remote_downloader(
        &self,
        settings: &Aria2Settings,
        config: &RemoteConfig,
    ) -> crate::Result<Arc<dyn RemoteDownloader>> {
        let client = Aria2Client::new(
            &settings.rpc_url,
            &settings.rpc_secret,
            config.push_timeout,
            config.status_timeout,
        )?;
        Ok(Arc::new(client))
    }

    fn uploader(
        &self,
        settings: &FtpSettings,
        config: &UploadConfig,
    ) -> crate::Result<Arc<dyn FileUploader>> {
        let uploader = FtpUploader::new(settings.clone(), config.clone())?;
        Ok(Arc::new(uploader))
    }
}

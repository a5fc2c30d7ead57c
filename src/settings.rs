//! Runtime settings stored in the database.
//!
//! Settings are a flat key/value table that operators edit while the engine runs.
//! Every decision point loads a fresh [`Settings`] snapshot; nothing here is cached.

use std::collections::HashMap;
use std::path::PathBuf;

/// Setting keys
pub mod keys {
    /// Maximum number of concurrently running downloader processes
    pub const MAX_CONCURRENT_DOWNLOADS: &str = "max_concurrent_downloads";
    /// Path to the stream downloader binary
    pub const DOWNLOADER_PATH: &str = "n_m3u8dl_path";
    /// Path to the ffmpeg binary used for the duration probe
    pub const FFMPEG_PATH: &str = "ffmpeg_path";
    /// Directory receiving finished files
    pub const DOWNLOAD_DIR: &str = "download_dir";
    /// Directory for the downloader's intermediate segments
    pub const TEMP_DIR: &str = "temp_dir";
    /// Enables the remote push after completion
    pub const ARIA2_ENABLED: &str = "aria2_enabled";
    /// JSON-RPC endpoint of the remote downloader
    pub const ARIA2_RPC_URL: &str = "aria2_rpc_url";
    /// JSON-RPC secret token
    pub const ARIA2_RPC_SECRET: &str = "aria2_rpc_secret";
    /// Remote output directory passed as the `dir` option
    pub const ARIA2_OUT_DIR: &str = "aria2_out_dir";
    /// Public base URL under which finished files are served
    pub const PUBLIC_HOST: &str = "public_host";
    /// Delete the local file once the remote copy is confirmed
    pub const DELETE_AFTER_DOWNLOAD: &str = "delete_after_download";
    /// Enables the FTP upload after completion
    pub const FTP_ENABLED: &str = "ftp_enabled";
    /// FTP server host
    pub const FTP_HOST: &str = "ftp_host";
    /// FTP server port
    pub const FTP_PORT: &str = "ftp_port";
    /// FTP user
    pub const FTP_USERNAME: &str = "ftp_username";
    /// FTP password
    pub const FTP_PASSWORD: &str = "ftp_password";
    /// Remote directory for uploads (created if missing)
    pub const FTP_REMOTE_DIR: &str = "ftp_remote_dir";
    /// Use passive mode for data connections
    pub const FTP_PASSIVE_MODE: &str = "ftp_passive_mode";
    /// Delete the local file after a successful upload
    pub const FTP_DELETE_AFTER_UPLOAD: &str = "ftp_delete_after_upload";
}

/// Default values seeded into an empty settings table
pub const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    (keys::MAX_CONCURRENT_DOWNLOADS, "3"),
    (keys::DOWNLOADER_PATH, "./bin/N_m3u8DL-RE"),
    (keys::FFMPEG_PATH, "./bin/ffmpeg"),
    (keys::DOWNLOAD_DIR, "./downloads"),
    (keys::TEMP_DIR, "./temp"),
    (keys::ARIA2_ENABLED, "false"),
    (keys::ARIA2_RPC_URL, "http://localhost:6800/jsonrpc"),
    (keys::ARIA2_RPC_SECRET, ""),
    (keys::ARIA2_OUT_DIR, ""),
    (keys::PUBLIC_HOST, "http://localhost:5000"),
    (keys::DELETE_AFTER_DOWNLOAD, "false"),
    (keys::FTP_ENABLED, "false"),
    (keys::FTP_HOST, ""),
    (keys::FTP_PORT, "21"),
    (keys::FTP_USERNAME, ""),
    (keys::FTP_PASSWORD, ""),
    (keys::FTP_REMOTE_DIR, ""),
    (keys::FTP_PASSIVE_MODE, "true"),
    (keys::FTP_DELETE_AFTER_UPLOAD, "false"),
];

/// Remote push settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Aria2Settings {
    /// Push enabled
    pub enabled: bool,
    /// JSON-RPC endpoint
    pub rpc_url: String,
    /// Secret token (empty = none)
    pub rpc_secret: String,
    /// Remote output directory
    pub out_dir: Option<String>,
    /// Public base URL for finished files
    pub public_host: String,
}

/// FTP upload settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FtpSettings {
    /// Upload enabled
    pub enabled: bool,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Login user
    pub username: String,
    /// Login password
    pub password: String,
    /// Remote directory (empty = login directory)
    pub remote_dir: String,
    /// Passive data connections
    pub passive_mode: bool,
    /// Delete the local file after a successful upload
    pub delete_after_upload: bool,
}

impl FtpSettings {
    /// Host and user are required before any connection is attempted
    pub fn is_complete(&self) -> bool {
        !self.host.trim().is_empty() && !self.username.trim().is_empty()
    }
}

/// Typed snapshot of the settings table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Concurrency ceiling for the admission loop
    pub max_concurrent_downloads: usize,
    /// Stream downloader binary
    pub downloader_path: PathBuf,
    /// ffmpeg binary
    pub ffmpeg_path: PathBuf,
    /// Destination directory for finished files
    pub download_dir: PathBuf,
    /// Intermediate directory
    pub temp_dir: PathBuf,
    /// Remote push
    pub aria2: Aria2Settings,
    /// Delete the local file once the remote copy is confirmed
    pub delete_after_download: bool,
    /// FTP upload
    pub ftp: FtpSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_map(&HashMap::new())
    }
}

impl Settings {
    /// Build a snapshot from raw key/value pairs, falling back to defaults
    /// for missing or unparseable values.
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let get = |key: &str| -> String {
            map.get(key)
                .cloned()
                .or_else(|| default_value(key).map(str::to_string))
                .unwrap_or_default()
        };
        let get_bool = |key: &str| get(key).trim() == "true";
        let get_num = |key: &str| -> Option<u64> { get(key).trim().parse().ok() };

        let out_dir = get(keys::ARIA2_OUT_DIR);

        Self {
            max_concurrent_downloads: get_num(keys::MAX_CONCURRENT_DOWNLOADS)
                .map(|n| n as usize)
                .unwrap_or(3),
            downloader_path: PathBuf::from(get(keys::DOWNLOADER_PATH)),
            ffmpeg_path: PathBuf::from(get(keys::FFMPEG_PATH)),
            download_dir: PathBuf::from(get(keys::DOWNLOAD_DIR)),
            temp_dir: PathBuf::from(get(keys::TEMP_DIR)),
            aria2: Aria2Settings {
                enabled: get_bool(keys::ARIA2_ENABLED),
                rpc_url: get(keys::ARIA2_RPC_URL),
                rpc_secret: get(keys::ARIA2_RPC_SECRET),
                out_dir: if out_dir.trim().is_empty() {
                    None
                } else {
                    Some(out_dir)
                },
                public_host: get(keys::PUBLIC_HOST),
            },
            delete_after_download: get_bool(keys::DELETE_AFTER_DOWNLOAD),
            ftp: FtpSettings {
                enabled: get_bool(keys::FTP_ENABLED),
                host: get(keys::FTP_HOST).trim().to_string(),
                port: get_num(keys::FTP_PORT)
                    .and_then(|p| u16::try_from(p).ok())
                    .unwrap_or(21),
                username: get(keys::FTP_USERNAME),
                password: get(keys::FTP_PASSWORD),
                remote_dir: get(keys::FTP_REMOTE_DIR),
                passive_mode: get_bool(keys::FTP_PASSIVE_MODE),
                delete_after_upload: get_bool(keys::FTP_DELETE_AFTER_UPLOAD),
            },
        }
    }
}

/// Look up the seeded default for a key
pub fn default_value(key: &str) -> Option<&'static str> {
    DEFAULT_SETTINGS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| *v)
}

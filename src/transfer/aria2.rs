//! aria2 JSON-RPC client

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::traits::{PushOptions, RemoteDownloader, RemoteJobState};
use crate::error::{Error, Result, TransferError};

/// JSON-RPC 2.0 client for an aria2 daemon
///
/// The secret, when set, travels as a `token:<secret>` first positional parameter.
pub struct Aria2Client {
    endpoint: url::Url,
    secret: String,
    http: reqwest::Client,
    push_timeout: Duration,
    status_timeout: Duration,
    next_id: AtomicU64,
}

impl Aria2Client {
    /// Create a client for `rpc_url`
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the URL does not parse.
    pub fn new(
        rpc_url: &str,
        secret: &str,
        push_timeout: Duration,
        status_timeout: Duration,
    ) -> Result<Self> {
        let endpoint = url::Url::parse(rpc_url.trim()).map_err(|e| Error::Config {
            message: format!("invalid aria2 RPC URL '{}': {}", rpc_url, e),
            key: Some(crate::settings::keys::ARIA2_RPC_URL.to_string()),
        })?;

        Ok(Self {
            endpoint,
            secret: secret.to_string(),
            http: reqwest::Client::new(),
            push_timeout,
            status_timeout,
            next_id: AtomicU64::new(1),
        })
    }

    fn params(&self, mut params: Vec<Value>) -> Vec<Value> {
        if !self.secret.is_empty() {
            params.insert(0, json!(format!("token:{}", self.secret)));
        }
        params
    }

    /// Perform one JSON-RPC call and return its `result`
    async fn call(&self, method: &str, params: Vec<Value>, timeout: Duration) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": format!("stream-dl-{}", id),
            "method": method,
            "params": self.params(params),
        });

        let response = self
            .http
            .post(self.endpoint.clone())
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                Error::Transfer(TransferError::RemotePush(format!(
                    "{} request failed: {}",
                    method, e
                )))
            })?;

        let status = response.status();
        let payload: Value = response.json().await.map_err(|e| {
            Error::Transfer(TransferError::RemotePush(format!(
                "{} returned HTTP {} with an unreadable body: {}",
                method, status, e
            )))
        })?;

        if let Some(err) = payload.get("error") {
            return Err(Error::Transfer(TransferError::RemotePush(format!(
                "{} rpc error: {}",
                method, err
            ))));
        }

        payload.get("result").cloned().ok_or_else(|| {
            Error::Transfer(TransferError::RemotePush(format!(
                "{} returned HTTP {} without a result",
                method, status
            )))
        })
    }
}

#[async_trait]
impl RemoteDownloader for Aria2Client {
    async fn add_uri(&self, uri: &str, options: &PushOptions) -> Result<String> {
        let mut opts = serde_json::Map::new();
        opts.insert("out".to_string(), json!(options.out));
        if let Some(dir) = &options.dir {
            opts.insert("dir".to_string(), json!(dir));
        }

        let result = self
            .call(
                "aria2.addUri",
                vec![json!([uri]), Value::Object(opts)],
                self.push_timeout,
            )
            .await?;

        result.as_str().map(str::to_string).ok_or_else(|| {
            Error::Transfer(TransferError::RemotePush(format!(
                "aria2.addUri returned a non-string gid: {}",
                result
            )))
        })
    }

    async fn tell_status(&self, gid: &str) -> Result<RemoteJobState> {
        let result = self
            .call("aria2.tellStatus", vec![json!(gid)], self.status_timeout)
            .await?;

        let status = result
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(RemoteJobState::parse(status))
    }

    fn name(&self) -> &'static str {
        "aria2"
    }
}

/// Public URL under which a finished file is served to the remote downloader
pub fn remote_file_url(public_host: &str, file_name: &str) -> String {
    format!(
        "{}/videos/{}",
        public_host.trim().trim_end_matches('/'),
        urlencoding::encode(file_name)
    )
}

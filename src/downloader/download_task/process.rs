//! Downloader process handling: arguments, spawn, output readers and group signals.

use std::ffi::OsString;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::config::ProcessConfig;
use crate::error::{Error, ProcessError, Result};

/// Command-line arguments for one download
pub(crate) fn build_downloader_args(
    url: &str,
    save_dir: &Path,
    save_name: &str,
    tmp_dir: &Path,
    config: &ProcessConfig,
) -> Vec<OsString> {
    vec![
        url.into(),
        "--save-dir".into(),
        save_dir.into(),
        "--save-name".into(),
        save_name.into(),
        "--tmp-dir".into(),
        tmp_dir.into(),
        "--thread-count".into(),
        config.thread_count.to_string().into(),
        "--download-retry-count".into(),
        config.retry_count.to_string().into(),
        "--auto-select".into(),
        "-M".into(),
        "format=mp4".into(),
        "--del-after-done".into(),
        "--log-level".into(),
        "INFO".into(),
    ]
}

/// Printable command line for the task log
pub(crate) fn command_line(binary: &Path, args: &[OsString]) -> String {
    std::iter::once(binary.as_os_str())
        .chain(args.iter().map(OsString::as_os_str))
        .map(|a| a.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Spawn the downloader in its own process group with piped output
pub(super) fn spawn_downloader(binary: &Path, args: &[OsString]) -> Result<Child> {
    let mut cmd = Command::new(binary);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    cmd.spawn().map_err(|e| {
        Error::Process(ProcessError::Spawn {
            binary: binary.to_path_buf(),
            reason: e.to_string(),
        })
    })
}

/// Send `signal` to the process group led by `pid`. Returns whether delivery succeeded.
#[cfg(unix)]
pub(crate) fn signal_group(pid: u32, signal: i32) -> bool {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: killpg only sends a signal; an invalid or exited group yields ESRCH
    let rc = unsafe { libc::killpg(pgid, signal) };
    if rc != 0 {
        tracing::debug!(
            pid,
            signal,
            error = %std::io::Error::last_os_error(),
            "process group signal not delivered"
        );
    }
    rc == 0
}

#[cfg(not(unix))]
pub(crate) fn signal_group(_pid: u32, _signal: i32) -> bool {
    false
}

/// Graceful terminate signal
#[cfg(unix)]
pub(crate) const TERMINATE: i32 = libc::SIGTERM;
#[cfg(not(unix))]
pub(crate) const TERMINATE: i32 = 15;

#[cfg(unix)]
const KILL: i32 = libc::SIGKILL;
#[cfg(not(unix))]
const KILL: i32 = 9;

/// Terminate the process group: graceful signal, then kill after `grace`
pub(super) async fn terminate(
    child: &mut Child,
    pid: Option<u32>,
    grace: Duration,
) -> Result<ExitStatus> {
    if let Some(pid) = pid {
        signal_group(pid, TERMINATE);
    } else {
        child.start_kill()?;
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => Ok(status?),
        Err(_) => {
            tracing::warn!(?pid, "downloader ignored terminate signal, killing");
            if let Some(pid) = pid {
                signal_group(pid, KILL);
            }
            // Also kills the leader if it escaped its group
            let _ = child.start_kill();
            Ok(child.wait().await?)
        }
    }
}

/// Kill the whole group immediately (used when a stop raced the spawn)
pub(super) async fn kill_now(child: &mut Child, pid: u32) {
    signal_group(pid, KILL);
    let _ = child.start_kill();
    let _ = child.wait().await;
}

/// Forward trimmed, non-empty output lines of `stream` to `tx`.
///
/// Carriage returns split lines as well, since progress bars redraw in place.
/// Invalid UTF-8 is replaced rather than treated as an error.
pub(super) fn spawn_reader<R>(stream: R, tx: UnboundedSender<String>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf);
                    for piece in text.split(['\r', '\n']) {
                        let line = piece.trim();
                        if !line.is_empty() && tx.send(line.to_string()).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(format!("output read error: {}", e));
                    break;
                }
            }
        }
    })
}

/// Map a non-success exit status to its error
pub(super) fn exit_error(status: ExitStatus) -> ProcessError {
    if let Some(code) = status.code() {
        return ProcessError::Exit { code };
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return ProcessError::Signaled { signal };
        }
    }

    ProcessError::Exit { code: -1 }
}

//! Run Nagios-compatible check plugins.
//!
//! Plugins follow the Nagios plugin API: the executable is spawned with the
//! expanded argument list, its exit code determines the check result and
//! its combined stdout/stderr output carries a human readable text part and
//! optional performance data separated by `|`. The performance data is
//! recorded but not interpreted.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

pub const STATUS_OK: i32 = 0;
pub const STATUS_WARNING: i32 = 1;
pub const STATUS_CRITICAL: i32 = 2;

/// Result type alias for plugin runs.
pub type PluginResult<T> = Result<T, PluginError>;

#[derive(Debug)]
pub enum PluginError {
    /// The plugin executable does not exist.
    NotFound,

    /// The check ran and reported a failure (CRITICAL or an unrecognized
    /// exit code). Carries the plugin output.
    Failed(String),

    /// Spawn or I/O error, including timeouts.
    Io(String),
}

impl std::fmt::Display for PluginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginError::NotFound => write!(f, "executable not found"),
            PluginError::Failed(msg) => write!(f, "monitor failed: {}", msg),
            PluginError::Io(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for PluginError {}

/// Parsed output of a successful plugin run.
#[derive(Debug, Clone)]
pub struct CheckOutput {
    pub text: String,
    pub perf: Vec<String>,
}

/// Run a check plugin and classify its result.
///
/// The child is killed if it does not terminate within `timeout`; a timed
/// out run is reported as [`PluginError::Io`].
pub async fn run_plugin(
    executable: &str,
    args: &[String],
    timeout: Duration,
) -> PluginResult<CheckOutput> {
    debug!("running plugin {} {:?}", executable, args);
    let child = Command::new(executable)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PluginError::NotFound,
            _ => PluginError::Io(format!("failed to spawn plugin: {e}")),
        })?;

    // kill_on_drop terminates the child when the timeout cancels the wait.
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| PluginError::Io(format!("plugin wait failed: {e}")))?,
        Err(_) => {
            return Err(PluginError::Io(format!(
                "plugin timed out after {}s",
                timeout.as_secs()
            )));
        }
    };

    let mut data = output.stdout;
    data.extend_from_slice(&output.stderr);

    // A signal-terminated child has no exit code; treat it like an
    // unrecognized status.
    let code = output.status.code().unwrap_or(-1);
    if !matches!(code, STATUS_OK | STATUS_WARNING | STATUS_CRITICAL) {
        return Err(PluginError::Failed(decode_output(&data)));
    }
    let (text, perf) = parse_output(&data);
    if code == STATUS_CRITICAL {
        return Err(PluginError::Failed(text));
    }
    Ok(CheckOutput { text, perf })
}

/// Split plugin output into its text part and performance data list.
pub fn parse_output(output: &[u8]) -> (String, Vec<String>) {
    let decoded = decode_output(output);
    match decoded.split_once('|') {
        None => (decoded.trim().to_string(), Vec::new()),
        Some((text, perf)) => (
            text.trim().to_string(),
            perf.split('|').map(str::to_string).collect(),
        ),
    }
}

/// Decode plugin output as latin-1; every byte maps to a char, so this
/// never loses data.
fn decode_output(output: &[u8]) -> String {
    output.iter().map(|&b| char::from(b)).collect()
}

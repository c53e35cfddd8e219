//! Child-process execution shared by the tool wrappers.

use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::{DiscoverError, Result};

/// Run `program` with `args`, returning stdout on a zero exit.
///
/// The child is killed if `limit` elapses first. `tool` and `target` only
/// label errors.
pub(crate) async fn run_tool(
    tool: &str,
    program: &str,
    args: &[&str],
    target: &str,
    limit: Duration,
) -> Result<Vec<u8>> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(limit, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
            return Err(DiscoverError::ToolNotFound {
                tool: tool.to_string(),
                path: program.to_string(),
            })
        }
        Ok(Err(e)) => return Err(DiscoverError::Io(e)),
        Err(_) => {
            return Err(DiscoverError::Timeout {
                tool: tool.to_string(),
                target: target.to_string(),
                secs: limit.as_secs(),
            })
        }
    };

    if !output.status.success() {
        return Err(DiscoverError::ToolFailed {
            tool: tool.to_string(),
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output.stdout)
}

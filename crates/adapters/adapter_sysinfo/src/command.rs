//! Bounded shell-outs to desktop tools.

use std::time::Duration;

use tokio::process::Command;

/// Run `program` and return trimmed stdout when it exits successfully
/// within `timeout`.
pub(crate) async fn output(program: &str, args: &[&str], timeout: Duration) -> Option<String> {
    let mut command = Command::new(program);
    command.args(args).kill_on_drop(true);

    match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(out)) if out.status.success() => {
            Some(String::from_utf8_lossy(&out.stdout).trim().to_string())
        }
        Ok(Ok(out)) => {
            tracing::trace!(program, status = %out.status, "probe command failed");
            None
        }
        Ok(Err(err)) => {
            tracing::trace!(program, error = %err, "probe command unavailable");
            None
        }
        Err(_) => {
            tracing::debug!(program, timeout_ms = timeout.as_millis(), "probe command timed out");
            None
        }
    }
}

/// `nvidia-smi --format=csv,noheader,nounits` line: `temperature, utilization`.
pub(crate) fn parse_gpu(line: &str) -> Option<(f64, f64)> {
    let mut fields = line.lines().next()?.split(',').map(str::trim);
    let temp = fields.next()?.parse().ok()?;
    let usage = fields.next()?.parse().ok()?;
    Some((temp, usage))
}

/// `WIDTH`/`HEIGHT` from `xdotool getwindowgeometry --shell`.
pub(crate) fn parse_shell_geometry(text: &str) -> Option<(u32, u32)> {
    let mut width = None;
    let mut height = None;
    for line in text.lines() {
        match line.split_once('=') {
            Some(("WIDTH", value)) => width = value.trim().parse().ok(),
            Some(("HEIGHT", value)) => height = value.trim().parse().ok(),
            _ => {}
        }
    }
    Some((width?, height?))
}

/// `xdotool getdisplaygeometry`: `WIDTH HEIGHT`.
pub(crate) fn parse_display_geometry(text: &str) -> Option<(u32, u32)> {
    let mut parts = text.split_whitespace();
    let width = parts.next()?.parse().ok()?;
    let height = parts.next()?.parse().ok()?;
    Some((width, height))
}

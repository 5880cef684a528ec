//! Invocation of the host networking tools.

use std::process::Command;

use minibox_common::error::{MiniboxError, Result};

/// Runs `program` with `args`, returning its stdout.
///
/// # Errors
///
/// Returns `MiniboxError::Command` if the program cannot be started or exits
/// unsuccessfully; the message carries the arguments and stderr.
pub fn run<S: AsRef<str>>(program: &str, args: &[S]) -> Result<String> {
    let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
    tracing::debug!(program, args = %args.join(" "), "running");
    let output = Command::new(program)
        .args(&args)
        .output()
        .map_err(|e| MiniboxError::Command {
            program: program.to_string(),
            message: format!("failed to start: {e}"),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MiniboxError::Command {
            program: program.to_string(),
            message: format!("{} ({}): {}", args.join(" "), output.status, stderr.trim()),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Runs `ip` with `args`.
///
/// # Errors
///
/// See [`run`].
pub fn ip<S: AsRef<str>>(args: &[S]) -> Result<String> {
    run("ip", args)
}

/// Runs `iptables` with `args`.
///
/// # Errors
///
/// See [`run`].
pub fn iptables<S: AsRef<str>>(args: &[S]) -> Result<()> {
    run("iptables", args).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_a_command_error() {
        let err = run("minibox-no-such-tool", &["x"]).unwrap_err();
        assert!(matches!(err, MiniboxError::Command { ref program, .. } if program == "minibox-no-such-tool"));
    }

    #[test]
    fn failing_program_reports_arguments() {
        let err = run("false", &["--flag"]).unwrap_err();
        assert!(err.to_string().contains("--flag"));
    }

    #[test]
    fn stdout_is_returned() {
        assert_eq!(run("echo", &["hello"]).unwrap().trim(), "hello");
    }
}

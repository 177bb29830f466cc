use std::process::{Command, Output, Stdio};

use bitflags::bitflags;
use tracing::{debug, trace, Level};

use crate::result::{bail, Result};

pub const YT_DLP: &str = "yt-dlp";
pub const FFMPEG: &str = "ffmpeg";

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capture: u8 {
        const STDIN = 0b0000001;
        const STDOUT = 0b0000010;
        const STDERR = 0b0000100;
    }
}

/// Run a command, returning its raw output handle.
///
/// IO handles will be captured only if the caller required it or if the log level is Debug.
/// In that last case, `stdout` and `stderr` will be logged.
///
/// The function returns an error only if the command failed to execute.
/// If the program runs but returns a non-0 status code, it will not trigger an error.
pub fn run_command<F: FnOnce(&mut Command) -> &mut Command>(
    program: &str,
    f: F,
    capture: Capture,
) -> Result<Output> {
    let is_debug = tracing::enabled!(Level::DEBUG);
    let get_io = |capture| {
        if capture {
            Stdio::piped()
        } else {
            Stdio::null()
        }
    };

    let mut cmd = Command::new(program);
    let cmd = f(&mut cmd)
        .stdin(get_io(capture.contains(Capture::STDIN)))
        .stdout(get_io(is_debug || capture.contains(Capture::STDOUT)))
        .stderr(get_io(is_debug || capture.contains(Capture::STDERR)));

    debug!("Executing command: {cmd:?}");
    let res = cmd.output()?;

    if is_debug {
        debug!("status: {}", res.status);
        debug!("stdout: {} bytes long", res.stdout.len());
        trace!("stdout: {:?}", String::from_utf8_lossy(&res.stdout));
        debug!("stderr: {} bytes long", res.stderr.len());
        trace!("stderr: {:?}", String::from_utf8_lossy(&res.stderr));
    }

    Ok(res)
}

/// Run the command and verify that it has returned a success status code.
pub fn assert_success_command<F: FnOnce(&mut Command) -> &mut Command>(
    program: &str,
    f: F,
) -> Result<()> {
    let res = run_command(program, f, Capture::empty())?;
    if res.status.success() {
        Ok(())
    } else {
        bail(format!("{program} did run but was not successful"))
    }
}

/// Keep the `ERROR:` lines of an extractor stderr output.
///
/// Fall back to the last non-empty line when the program did not flag any line.
pub fn error_lines(stderr: &[u8]) -> String {
    let stderr = String::from_utf8_lossy(stderr);
    let errors: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("ERROR:"))
        .map(|line| line.trim_start_matches("ERROR:").trim())
        .collect();

    if !errors.is_empty() {
        return errors.join("\n");
    }

    stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("the extractor exited without any message")
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::error_lines;

    #[test]
    fn error_lines_keeps_flagged_lines() {
        let stderr = b"WARNING: something odd\nERROR: [youtube] abc: Sign in to confirm you're not a bot\n";
        assert_eq!(
            error_lines(stderr),
            "[youtube] abc: Sign in to confirm you're not a bot"
        );
    }

    #[test]
    fn error_lines_falls_back_to_last_line() {
        assert_eq!(error_lines(b"first\nsecond\n\n"), "second");
        assert_eq!(
            error_lines(b""),
            "the extractor exited without any message"
        );
    }
}

//! Launching the user's browser

use std::io;
use std::process::{Command, Stdio};

/// Opens a URL for the user to visit
pub trait UrlOpener: Send + Sync {
    /// Open `url`; failures are reported but never abort the flow
    ///
    /// # Errors
    ///
    /// Returns error if no opener could be launched
    fn open(&self, url: &str) -> io::Result<()>;
}

/// Platform default URL opener (`open`, `xdg-open`, `start`)
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl SystemBrowser {
    fn command(url: &str) -> io::Result<Command> {
        if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", "start", ""]).arg(url);
            return Ok(cmd);
        }

        let program = if cfg!(target_os = "macos") {
            "open"
        } else {
            "xdg-open"
        };
        let path = which::which(program)
            .map_err(|e| io::Error::new(io::ErrorKind::NotFound, format!("{program}: {e}")))?;

        let mut cmd = Command::new(path);
        cmd.arg(url);
        Ok(cmd)
    }
}

impl UrlOpener for SystemBrowser {
    fn open(&self, url: &str) -> io::Result<()> {
        let mut child = Self::command(url)?
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        // Reap the launcher in the background so it never lingers as a zombie
        std::thread::spawn(move || {
            if let Err(e) = child.wait() {
                tracing::debug!(error = %e, "browser launcher did not exit cleanly");
            }
        });

        Ok(())
    }
}

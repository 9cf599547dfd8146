use std::process::Command;
use std::time::Duration;

/// Flag convention of the host's `ping` utility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// `-n <count> -w <millis>`
    Windows,
    /// `-c <count> -W <seconds>` (iputils, BusyBox)
    Linux,
    /// `-c <count> -W <millis>` (macOS and the BSDs)
    Bsd,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(any(
            target_os = "macos",
            target_os = "ios",
            target_os = "freebsd",
            target_os = "openbsd",
            target_os = "netbsd",
            target_os = "dragonfly"
        )) {
            Platform::Bsd
        } else {
            Platform::Linux
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl PingCommand {
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

/// One-shot ping of `target` bounded by `timeout`.
pub fn build_ping_command(target: &str, timeout: Duration, platform: Platform) -> PingCommand {
    let millis = timeout.as_millis().max(1);
    let args = match platform {
        Platform::Windows => vec![
            "-n".to_string(),
            "1".to_string(),
            "-w".to_string(),
            millis.to_string(),
            target.to_string(),
        ],
        Platform::Linux => {
            let secs = ((millis + 999) / 1000).max(1);
            vec![
                "-c".to_string(),
                "1".to_string(),
                "-W".to_string(),
                secs.to_string(),
                target.to_string(),
            ]
        }
        Platform::Bsd => vec![
            "-c".to_string(),
            "1".to_string(),
            "-W".to_string(),
            millis.to_string(),
            target.to_string(),
        ],
    };

    PingCommand {
        program: "ping".to_string(),
        args,
    }
}

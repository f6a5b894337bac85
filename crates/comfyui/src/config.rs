use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

/// Launcher configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct LauncherConfig {
    /// Interpreter used to start ComfyUI's `main.py`.
    pub python: String,
    /// Address ComfyUI listens on (`--listen`).
    pub bind_host: String,
    /// Host handed back to clients in launch results.
    pub public_host: String,
    /// Ports handed out to runs, inclusive.
    pub port_range: RangeInclusive<u16>,
    /// Per-run scratch directories (logs) live under this root.
    pub run_root: PathBuf,
    /// Runs are torn down after this long.
    pub max_lifetime: Duration,
    /// How long a spawned instance may take to answer HTTP.
    pub startup_timeout: Duration,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            python: "python3".into(),
            bind_host: "127.0.0.1".into(),
            public_host: "127.0.0.1".into(),
            port_range: 8188..=8288,
            run_root: std::env::temp_dir().join("comfyui-workflow"),
            max_lifetime: Duration::from_secs(3600),
            startup_timeout: Duration::from_secs(120),
        }
    }
}

impl LauncherConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                  |
    /// |----------------------------|--------------------------|
    /// | `COMFYUI_PYTHON`           | `python3`                |
    /// | `COMFYUI_BIND_HOST`        | `127.0.0.1`              |
    /// | `COMFYUI_PUBLIC_HOST`      | `COMFYUI_BIND_HOST`      |
    /// | `COMFYUI_PORT_RANGE`       | `8188-8288`              |
    /// | `RUN_ROOT`                 | `$TMPDIR/comfyui-workflow` |
    /// | `RUN_MAX_LIFETIME_SECS`    | `3600`                   |
    /// | `RUN_STARTUP_TIMEOUT_SECS` | `120`                    |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let python = std::env::var("COMFYUI_PYTHON").unwrap_or(defaults.python);
        let bind_host = std::env::var("COMFYUI_BIND_HOST").unwrap_or(defaults.bind_host);
        let public_host = std::env::var("COMFYUI_PUBLIC_HOST").unwrap_or_else(|_| bind_host.clone());

        let port_range = match std::env::var("COMFYUI_PORT_RANGE") {
            Ok(raw) => parse_port_range(&raw)
                .unwrap_or_else(|| panic!("COMFYUI_PORT_RANGE must look like 8188-8288, got '{raw}'")),
            Err(_) => defaults.port_range,
        };

        let run_root = std::env::var("RUN_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.run_root);

        let max_lifetime = Duration::from_secs(
            std::env::var("RUN_MAX_LIFETIME_SECS")
                .unwrap_or_else(|_| "3600".into())
                .parse()
                .expect("RUN_MAX_LIFETIME_SECS must be a valid u64"),
        );

        let startup_timeout = Duration::from_secs(
            std::env::var("RUN_STARTUP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "120".into())
                .parse()
                .expect("RUN_STARTUP_TIMEOUT_SECS must be a valid u64"),
        );

        Self {
            python,
            bind_host,
            public_host,
            port_range,
            run_root,
            max_lifetime,
            startup_timeout,
        }
    }
}

/// Parse `start-end` into an inclusive range. `start` must not exceed `end`.
pub fn parse_port_range(raw: &str) -> Option<RangeInclusive<u16>> {
    let (start, end) = raw.trim().split_once('-')?;
    let start: u16 = start.trim().parse().ok()?;
    let end: u16 = end.trim().parse().ok()?;
    (start <= end && start > 0).then_some(start..=end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_port_ranges() {
        assert_eq!(parse_port_range("8188-8288"), Some(8188..=8288));
        assert_eq!(parse_port_range(" 9000 - 9000 "), Some(9000..=9000));
        assert_eq!(parse_port_range("9001-9000"), None);
        assert_eq!(parse_port_range("0-10"), None);
        assert_eq!(parse_port_range("8188"), None);
        assert_eq!(parse_port_range("a-b"), None);
    }
}

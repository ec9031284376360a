//! Relaunching the game client

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::Settings;
use crate::Result;

/// Starts a fresh client process
pub trait ClientLauncher: Send + Sync {
    fn launch(&self) -> Result<()>;
}

/// Launches the client from a configured executable path
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandLauncher {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Launcher described by `launcher_path` / `launcher_args`, if configured
    pub fn from_settings(settings: &Settings) -> Option<Self> {
        settings
            .launcher_path
            .as_ref()
            .map(|path| Self::new(path, settings.launcher_args.clone()))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl ClientLauncher for CommandLauncher {
    fn launch(&self) -> Result<()> {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(dir) = self.program.parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }
        let child = command.spawn()?;
        log::info!("launched {} (pid {})", self.program.display(), child.id());
        Ok(())
    }
}

/// Launcher that only counts calls (for testing)
#[derive(Debug, Default)]
pub struct MockLauncher {
    launches: AtomicUsize,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl ClientLauncher for MockLauncher {
    fn launch(&self) -> Result<()> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AutopilotError;
    use serde_json::json;

    #[test]
    fn test_launcher_from_settings() {
        let settings = Settings::from_value(json!({
            "launcher_path": "C:/Games/Warcraft III/Frozen Throne.exe",
            "launcher_args": ["-window"]
        }))
        .unwrap();
        let launcher = CommandLauncher::from_settings(&settings).unwrap();
        assert_eq!(
            launcher.program(),
            Path::new("C:/Games/Warcraft III/Frozen Throne.exe")
        );
        assert_eq!(launcher.args, vec!["-window".to_string()]);
    }

    #[test]
    fn test_launcher_unconfigured() {
        assert!(CommandLauncher::from_settings(&Settings::default()).is_none());
    }

    #[test]
    fn test_launch_missing_program_fails() {
        let launcher = CommandLauncher::new("/nonexistent/nox/client", Vec::new());
        assert!(matches!(launcher.launch(), Err(AutopilotError::Io(_))));
    }

    #[test]
    fn test_mock_launcher_counts() {
        let launcher = MockLauncher::new();
        launcher.launch().unwrap();
        launcher.launch().unwrap();
        assert_eq!(launcher.launches(), 2);
    }
}

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use super::{DeviceDriver, DriverError};

/// Returns the device to its home screen and kills running apps (reset).
pub const CLOSE_APPLICATIONS: &str = "close_applications";
/// Kills stray automation processes left on the device (every exit path).
pub const SHUTDOWN_AUTOMATION: &str = "shutdown_automation";

const BUILTIN: &[(&str, &str)] = &[
    (CLOSE_APPLICATIONS, "input keyevent KEYCODE_HOME && am kill-all"),
    (
        SHUTDOWN_AUTOMATION,
        "pkill -f com.android.commands.monkey || true",
    ),
];

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0} is not a supported device command")]
    Unknown(String),
    #[error("device command file {path:?} is empty")]
    Empty { path: PathBuf },
    #[error("failed to read device commands from {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Named shell commands run on the device through [`DeviceDriver::shell`].
#[derive(Clone, Debug)]
pub struct ShellCommands {
    commands: BTreeMap<String, String>,
}

impl Default for ShellCommands {
    fn default() -> Self {
        Self {
            commands: BUILTIN
                .iter()
                .map(|(name, body)| ((*name).to_owned(), (*body).to_owned()))
                .collect(),
        }
    }
}

impl ShellCommands {
    /// Built-in commands overridden (or extended) by every `<name>.sh` in `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, CommandError> {
        let mut commands = Self::default();
        let entries = std::fs::read_dir(dir).map_err(|source| CommandError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        for entry in entries {
            let path = entry
                .map_err(|source| CommandError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?
                .path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("sh") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let contents = std::fs::read_to_string(&path).map_err(|source| CommandError::Io {
                path: path.clone(),
                source,
            })?;
            let body = script_body(&contents);
            if body.is_empty() {
                return Err(CommandError::Empty { path });
            }
            debug!(command = name, path = %path.display(), "loaded device command override");
            commands.commands.insert(name.to_owned(), body);
        }
        Ok(commands)
    }

    pub fn get(&self, name: &str) -> Result<&str, CommandError> {
        self.commands
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| CommandError::Unknown(name.to_owned()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    pub async fn run<D>(&self, driver: &mut D, name: &str) -> Result<(), CommandError>
    where
        D: DeviceDriver + ?Sized,
    {
        let command = self.get(name)?;
        debug!(command = name, "running device command");
        driver.shell(command).await?;
        Ok(())
    }

    pub async fn close_applications<D>(&self, driver: &mut D) -> Result<(), CommandError>
    where
        D: DeviceDriver + ?Sized,
    {
        self.run(driver, CLOSE_APPLICATIONS).await
    }

    pub async fn shutdown_automation<D>(&self, driver: &mut D) -> Result<(), CommandError>
    where
        D: DeviceDriver + ?Sized,
    {
        self.run(driver, SHUTDOWN_AUTOMATION).await
    }
}

// Shebang and comment lines are dropped; the rest runs as one `sh` invocation.
fn script_body(contents: &str) -> String {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n")
}

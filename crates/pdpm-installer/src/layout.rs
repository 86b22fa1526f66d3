use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use pdpm_core::{LOCK_FILE_NAME, MANIFEST_FILE_NAME};

use crate::EnvError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Posix,
    Windows,
}

impl Platform {
    pub fn current() -> Result<Self, EnvError> {
        Self::parse(std::env::consts::FAMILY)
    }

    pub fn parse(value: &str) -> Result<Self, EnvError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "posix" | "unix" => Ok(Self::Posix),
            "windows" | "nt" => Ok(Self::Windows),
            _ => Err(EnvError::UnsupportedPlatform(value.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Posix => "posix",
            Self::Windows => "windows",
        }
    }

    /// Directory holding interpreter binaries and activation scripts.
    pub fn scripts_dir_name(self) -> &'static str {
        match self {
            Self::Posix => "bin",
            Self::Windows => "Scripts",
        }
    }

    pub fn python_file_name(self) -> &'static str {
        match self {
            Self::Posix => "python",
            Self::Windows => "python.exe",
        }
    }

    pub fn activation_descriptor_name(self) -> &'static str {
        match self {
            Self::Posix => "activate",
            Self::Windows => "activate.bat",
        }
    }

    pub fn path_separator(self) -> &'static str {
        match self {
            Self::Posix => ":",
            Self::Windows => ";",
        }
    }

    pub fn default_interpreter(self) -> &'static str {
        match self {
            Self::Posix => "python3",
            Self::Windows => "python",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Paths of everything pdpm reads or writes, relative to one project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE_NAME)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE_NAME)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(".cache")
    }

    pub fn package_cache_dir(&self) -> PathBuf {
        self.cache_dir().join("packages")
    }

    pub fn env_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn ensure_base_dirs(&self) -> Result<(), EnvError> {
        for dir in [self.cache_dir(), self.package_cache_dir()] {
            fs::create_dir_all(&dir).map_err(|source| EnvError::Io {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

pub fn default_project_root() -> Result<PathBuf, EnvError> {
    std::env::current_dir().map_err(|source| EnvError::Io {
        path: PathBuf::from("."),
        source,
    })
}

/// An environment lives directly under the project root, so its name must be
/// exactly one plain path component.
pub fn validate_env_name(name: &str) -> Result<(), EnvError> {
    let invalid = |reason| EnvError::InvalidName {
        name: name.to_string(),
        reason,
    };
    if name.trim().is_empty() {
        return Err(invalid("must not be empty"));
    }
    if name.contains(['/', '\\']) {
        return Err(invalid("must not contain path separators"));
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(component)), None) if component == name => {}
        _ => return Err(invalid("must be a single directory name under the project root")),
    }
    Ok(())
}

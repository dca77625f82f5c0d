use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const CONFIG_DIR_ENV_VAR: &str = "DOCSPLIT_CONFIG_DIR";

/// Per-user directory holding learned state such as `feedback.json`.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the configuration directory from, in order of priority:
    /// 1. An explicit path (from --config-dir)
    /// 2. The DOCSPLIT_CONFIG_DIR environment variable
    /// 3. The XDG config directory (~/.config/docsplit/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = if let Some(path) = explicit {
            path.to_path_buf()
        } else if let Ok(val) = std::env::var(CONFIG_DIR_ENV_VAR) {
            PathBuf::from(val)
        } else {
            xdg::BaseDirectories::with_prefix("docsplit")
                .get_config_home()
                .ok_or_else(|| {
                    Error::Config(
                        "could not determine XDG config home directory".into(),
                    )
                })?
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::ConfigDir(root.clone()))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn feedback_file(&self) -> PathBuf {
        self.root.join("feedback.json")
    }
}

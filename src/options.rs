use crate::language::runtime_abi::DEFAULT_RUNTIME_OWNER;
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Class-file major version 49 needs no stack map frames.
pub const DEFAULT_CLASS_VERSION: u16 = 49;
/// From 51 on the verifier requires `StackMapTable`, which the assembler never writes.
pub const MAX_CLASS_VERSION: u16 = 50;
const MIN_CLASS_VERSION: u16 = 45;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodegenOptions {
    /// Major version written to every class file; at most [`MAX_CLASS_VERSION`].
    pub class_version: u16,
    /// Internal name of the class holding the runtime functions.
    pub runtime_owner: String,
    /// Emit the static `instance` field on every file unit.
    pub emit_instance: bool,
    pub trace: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            class_version: DEFAULT_CLASS_VERSION,
            runtime_owner: DEFAULT_RUNTIME_OWNER.to_string(),
            emit_instance: true,
            trace: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("failed to read {}: {error}", path.display())]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error(
        "class file version {version} is not supported (expected {} to {})",
        MIN_CLASS_VERSION,
        MAX_CLASS_VERSION
    )]
    UnsupportedClassVersion { version: u16 },
}

/// The `[codegen]` table of a project manifest.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct CodegenSettings {
    pub class_version: Option<u16>,
    pub runtime_owner: Option<String>,
    pub emit_instance: Option<bool>,
    pub trace: Option<bool>,
}

#[derive(Deserialize)]
struct RawManifest {
    #[serde(default)]
    codegen: CodegenSettings,
}

impl CodegenSettings {
    pub fn parse(content: &str, path: &Path) -> Result<Self, OptionsError> {
        let raw: RawManifest = toml::from_str(content).map_err(|error| OptionsError::Parse {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?;
        Ok(raw.codegen)
    }

    pub fn load(path: &Path) -> Result<Self, OptionsError> {
        let content = fs::read_to_string(path).map_err(|error| OptionsError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        Self::parse(&content, path)
    }
}

impl CodegenOptions {
    /// Explicit values win over the environment, which wins over the manifest.
    pub fn from_sources(
        version_flag: Option<u16>,
        owner_flag: Option<String>,
        manifest: Option<&CodegenSettings>,
    ) -> Result<Self, OptionsError> {
        let defaults = Self::default();
        let class_version = version_flag
            .or_else(|| {
                env::var("IXION_CLASS_VERSION")
                    .ok()
                    .and_then(|v| v.trim().parse().ok())
            })
            .or_else(|| manifest.and_then(|m| m.class_version))
            .unwrap_or(defaults.class_version);
        if !(MIN_CLASS_VERSION..=MAX_CLASS_VERSION).contains(&class_version) {
            return Err(OptionsError::UnsupportedClassVersion {
                version: class_version,
            });
        }
        let runtime_owner = owner_flag
            .or_else(|| env::var("IXION_RUNTIME_OWNER").ok())
            .or_else(|| manifest.and_then(|m| m.runtime_owner.clone()))
            .filter(|owner| !owner.trim().is_empty())
            .unwrap_or(defaults.runtime_owner);
        let emit_instance = manifest
            .and_then(|m| m.emit_instance)
            .unwrap_or(defaults.emit_instance);
        let trace = env::var_os("IXION_DEBUG_TRACE").is_some()
            || manifest.and_then(|m| m.trace).unwrap_or(false);
        Ok(Self {
            class_version,
            runtime_owner,
            emit_instance,
            trace,
        })
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn without_instance(mut self) -> Self {
        self.emit_instance = false;
        self
    }
}

use crate::affine::DEFAULT_TRANSFORM_PATTERN;
use crate::dataset::DEFAULT_REQUIRED_SUFFIXES;
use crate::error::{Error, Result};
use crate::gradients::DEFAULT_B0_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// decimals of b-vector output. Matches the `%.8f` files produced by FSL-style tooling
pub const DEFAULT_DECIMALS: usize = 8;

/// f64 cannot carry more fractional digits than this meaningfully
const MAX_DECIMALS: usize = 17;

/// parameters of the whole tool set, stored as toml with one table per tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OasisParams {
    pub rotate: RotateParams,
    pub check: CheckParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotateParams {
    /// b-values at or below this are b0 volumes and are not rotated
    pub b0_threshold: f64,
    /// fractional digits written per b-vector component
    pub decimals: usize,
    /// substring identifying the linear transform variable in the .mat container
    pub transform_pattern: String,
    /// replace the linear block by its closest rotation before applying it
    pub orthogonalize: bool,
}

impl Default for RotateParams {
    fn default() -> Self {
        Self {
            b0_threshold: DEFAULT_B0_THRESHOLD,
            decimals: DEFAULT_DECIMALS,
            transform_pattern: DEFAULT_TRANSFORM_PATTERN.to_string(),
            orthogonalize: false,
        }
    }
}

impl RotateParams {
    pub fn validate(&self) -> Result<()> {
        if !self.b0_threshold.is_finite() || self.b0_threshold < 0. {
            return Err(Error::InvalidParams(format!(
                "b0_threshold must be a non-negative number, got {}",
                self.b0_threshold
            )));
        }
        if self.decimals > MAX_DECIMALS {
            return Err(Error::InvalidParams(format!(
                "decimals must be at most {MAX_DECIMALS}, got {}",
                self.decimals
            )));
        }
        if self.transform_pattern.is_empty() {
            return Err(Error::InvalidParams("transform_pattern must not be empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckParams {
    /// file name suffixes expected after `<sub>_<ses>` in every session folder
    pub required_suffixes: Vec<String>,
}

impl Default for CheckParams {
    fn default() -> Self {
        Self {
            required_suffixes: DEFAULT_REQUIRED_SUFFIXES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl CheckParams {
    pub fn validate(&self) -> Result<()> {
        if self.required_suffixes.is_empty() {
            return Err(Error::InvalidParams("required_suffixes must not be empty".to_string()));
        }
        if let Some(s) = self.required_suffixes.iter().find(|s| s.contains('/')) {
            return Err(Error::InvalidParams(format!("suffix '{s}' must not contain a path separator")));
        }
        Ok(())
    }
}

impl OasisParams {
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let params: Self = toml::from_str(toml_str).map_err(|e| Error::InvalidParams(e.to_string()))?;
        params.rotate.validate()?;
        params.check.validate()?;
        Ok(params)
    }

    pub fn from_toml_file(file: impl AsRef<Path>) -> Result<Self> {
        let path = file.as_ref();
        let toml_str = fs::read_to_string(path).map_err(|source| Error::InputNotFound { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&toml_str)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        let mut toml_string = toml::to_string(self).map_err(|e| Error::InvalidParams(e.to_string()))?;
        toml_string.push('\n');
        Ok(toml_string)
    }
}

//! デプロイ先の検証

use crate::error::{DeployError, Result};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Aws,
    Gcp,
    Azure,
    Local,
}

impl Target {
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Aws => "aws",
            Target::Gcp => "gcp",
            Target::Azure => "azure",
            Target::Local => "local",
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, Target::Aws)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Target {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "aws" => Ok(Target::Aws),
            "gcp" => Ok(Target::Gcp),
            "azure" => Ok(Target::Azure),
            "local" => Ok(Target::Local),
            _ => Err(DeployError::Validation(format!(
                "不明なデプロイ先です: '{}'",
                s
            ))),
        }
    }
}

/// デプロイ先が対応済みで、使うプロバイダーと一致することを確認する
pub fn validate_target(target: &str, provider_name: &str) -> Result<Target> {
    let parsed: Target = target.parse()?;
    if !parsed.is_supported() {
        return Err(DeployError::Validation(format!(
            "デプロイ先 '{}' にはまだ対応していません",
            parsed
        )));
    }
    if parsed.as_str() != provider_name {
        return Err(DeployError::Validation(format!(
            "デプロイ先 '{}' とプロバイダー '{}' が一致しません",
            parsed, provider_name
        )));
    }
    Ok(parsed)
}

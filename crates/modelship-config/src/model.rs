//! 設定ファイルのデータモデル

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_VERSION: &str = "0.1.0";
pub const DEFAULT_ITERATION: &str = "baseline";
pub const DEFAULT_TARGET: &str = "aws";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_STAGE: &str = "dev";
pub const DEFAULT_KEEP_WARM: &str = "rate(5 minutes)";
pub const DEFAULT_DESTROY_ORDER: &str = "reverse-creation";

/// modelship.kdl 全体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub project: ProjectSettings,
    pub model: Option<ModelSettings>,
    /// アップロードするログディレクトリ
    pub logs: Option<PathBuf>,
    pub target: TargetSettings,
    /// リモート設定サービスのベースURL
    pub remote: Option<String>,
    pub polling: PollingSettings,
    pub destroy_order: String,
}

impl Settings {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project: ProjectSettings::new(project_name),
            model: None,
            logs: None,
            target: TargetSettings::default(),
            remote: None,
            polling: PollingSettings::default(),
            destroy_order: DEFAULT_DESTROY_ORDER.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSettings {
    pub name: String,
    pub version: String,
    pub description: String,
    /// 新しく開く iteration の名前
    pub iteration: String,
}

impl ProjectSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: DEFAULT_VERSION.to_string(),
            description: String::new(),
            iteration: DEFAULT_ITERATION.to_string(),
        }
    }
}

/// モデル成果物
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub path: PathBuf,
    /// 省略時は拡張子から推定する
    pub framework: Option<String>,
}

/// デプロイ先
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSettings {
    pub provider: String,
    pub profile: Option<String>,
    pub region: String,
    pub stage: String,
    /// None ならウォームアップ用のスケジュールを作らない
    pub keep_warm: Option<String>,
}

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            provider: DEFAULT_TARGET.to_string(),
            profile: None,
            region: DEFAULT_REGION.to_string(),
            stage: DEFAULT_STAGE.to_string(),
            keep_warm: Some(DEFAULT_KEEP_WARM.to_string()),
        }
    }
}

/// ポーリング間隔と最大試行回数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSetting {
    pub interval_secs: u64,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingSettings {
    pub build: PollSetting,
    pub function: PollSetting,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            build: PollSetting {
                interval_secs: 15,
                attempts: 30,
            },
            function: PollSetting {
                interval_secs: 5,
                attempts: 15,
            },
        }
    }
}

/// `modelship init` が書き出す雛形
pub fn settings_template(project_name: &str) -> String {
    format!(
        r#"project "{name}" {{
    version "{version}"
    description ""
    iteration "{iteration}"
}}

model "model.pkl" framework="sklearn"
logs "logs"

target "{target}" {{
    profile "default"
    region "{region}"
    stage "{stage}"
    keep-warm "{keep_warm}"
}}

polling {{
    build interval=15 attempts=30
    function interval=5 attempts=15
}}

destroy-order "{order}"
"#,
        name = project_name.replace('\\', "\\\\").replace('"', "\\\""),
        version = DEFAULT_VERSION,
        iteration = DEFAULT_ITERATION,
        target = DEFAULT_TARGET,
        region = DEFAULT_REGION,
        stage = DEFAULT_STAGE,
        keep_warm = DEFAULT_KEEP_WARM,
        order = DEFAULT_DESTROY_ORDER,
    )
}

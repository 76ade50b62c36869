//! 学習ログの記録
//!
//! 表・グラフ・数値・テキストを `modelship-log-{key}.json` としてログディレクトリに
//! 書き出す。ログディレクトリはデプロイ時と `update --logs` でまとめて
//! アップロードされる。

use crate::error::{DeployError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

const FILE_PREFIX: &str = "modelship-log-";

/// 表形式のログ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(DeployError::Validation("表に列がありません".into()));
        }
        if let Some(i) = self.rows.iter().position(|r| r.len() != self.columns.len()) {
            return Err(DeployError::Validation(format!(
                "表の {} 行目の列数が {} ではありません",
                i + 1,
                self.columns.len()
            )));
        }
        Ok(())
    }
}

/// 記録する値
#[derive(Debug, Clone)]
pub enum LogValue {
    Table(Table),
    /// 画像ファイル（ログディレクトリにコピーされる）
    Plot(PathBuf),
    Float(f64),
    String(String),
}

/// 保存される中身
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "log_type", content = "data", rename_all = "lowercase")]
pub enum LogData {
    Table(Table),
    /// ログディレクトリ内の画像ファイル名
    Plot(String),
    Float(f64),
    String(String),
}

impl LogData {
    pub fn kind(&self) -> &'static str {
        match self {
            LogData::Table(_) => "table",
            LogData::Plot(_) => "plot",
            LogData::Float(_) => "float",
            LogData::String(_) => "string",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub key: String,
    pub annotation: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub data: LogData,
}

/// 空白を `_` に置き換えたキー（ファイル名に使う）
pub fn normalize_key(key: &str) -> Result<String> {
    let key = key.trim().replace(' ', "_");
    if key.is_empty() {
        return Err(DeployError::Validation("ログのキーが空です".into()));
    }
    if key.contains(['/', '\\']) || key.starts_with('.') {
        return Err(DeployError::Validation(format!(
            "ログのキー '{}' はファイル名に使えません",
            key
        )));
    }
    Ok(key)
}

pub fn entry_path(logs_dir: &Path, key: &str) -> PathBuf {
    logs_dir.join(format!("{}{}.json", FILE_PREFIX, key))
}

/// ログを1件書き出す。同じキーのログは上書きする。
pub async fn record(
    logs_dir: &Path,
    key: &str,
    value: LogValue,
    annotation: Option<&str>,
) -> Result<LogEntry> {
    let key = normalize_key(key)?;
    fs::create_dir_all(logs_dir).await?;

    let data = match value {
        LogValue::Table(table) => {
            table.validate()?;
            LogData::Table(table)
        }
        LogValue::Plot(image) => LogData::Plot(copy_plot(logs_dir, &key, &image).await?),
        LogValue::Float(v) if !v.is_finite() => {
            return Err(DeployError::Validation(format!(
                "ログ '{}' の値 {} は記録できません",
                key, v
            )));
        }
        LogValue::Float(v) => LogData::Float(v),
        LogValue::String(s) => LogData::String(s),
    };

    let entry = LogEntry {
        key: key.clone(),
        annotation: annotation.map(str::to_string),
        created_at: Utc::now(),
        data,
    };

    let path = entry_path(logs_dir, &key);
    if path.exists() {
        warn!(key = %key, "Overwriting existing log entry");
    }
    fs::write(&path, serde_json::to_string_pretty(&entry)?).await?;
    debug!(key = %key, kind = entry.data.kind(), path = %path.display(), "Recorded log");
    Ok(entry)
}

async fn copy_plot(logs_dir: &Path, key: &str, image: &Path) -> Result<String> {
    if !image.is_file() {
        return Err(DeployError::NotFound(format!(
            "画像ファイル {}",
            image.display()
        )));
    }
    let extension = image
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("png")
        .to_lowercase();
    let file_name = format!("{}{}.{}", FILE_PREFIX, key, extension);
    fs::copy(image, logs_dir.join(&file_name)).await?;
    Ok(file_name)
}

/// ログディレクトリ内の記録をキー順に読み込む
pub async fn read_entries(logs_dir: &Path) -> Result<Vec<LogEntry>> {
    if !logs_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    let mut dir = fs::read_dir(logs_dir).await?;
    while let Some(item) = dir.next_entry().await? {
        let name = item.file_name().to_string_lossy().to_string();
        if !(name.starts_with(FILE_PREFIX) && name.ends_with(".json")) {
            continue;
        }
        let content = fs::read_to_string(item.path()).await?;
        match serde_json::from_str::<LogEntry>(&content) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(file = %name, "Skipping unreadable log entry: {}", e),
        }
    }
    entries.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(entries)
}

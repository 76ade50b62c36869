use crate::context::Context;
use colored::Colorize;
use modelship_deploy::logs::{self, LogValue, Table};
use std::path::PathBuf;

/// 記録する値（いずれか1つ）
pub struct LogInput {
    pub float: Option<f64>,
    pub text: Option<String>,
    pub table: Option<PathBuf>,
    pub plot: Option<PathBuf>,
}

impl LogInput {
    fn into_value(self) -> anyhow::Result<LogValue> {
        match self {
            LogInput { float: Some(v), .. } => Ok(LogValue::Float(v)),
            LogInput { text: Some(s), .. } => Ok(LogValue::String(s)),
            LogInput { table: Some(path), .. } => {
                let content = std::fs::read_to_string(&path)?;
                let table: Table = serde_json::from_str(&content).map_err(|e| {
                    anyhow::anyhow!(
                        "{} は {{\"columns\": [...], \"rows\": [[...]]}} 形式ではありません: {}",
                        path.display(),
                        e
                    )
                })?;
                Ok(LogValue::Table(table))
            }
            LogInput { plot: Some(path), .. } => Ok(LogValue::Plot(path)),
            _ => anyhow::bail!("--float / --text / --table / --plot のいずれかを指定してください"),
        }
    }
}

pub async fn handle(
    ctx: &Context,
    key: &str,
    input: LogInput,
    annotate: Option<&str>,
) -> anyhow::Result<()> {
    let logs_dir = ctx.logs_dir()?;
    let entry = logs::record(&logs_dir, key, input.into_value()?, annotate).await?;

    println!(
        "✓ ログ {} ({}) を記録しました",
        entry.key.cyan(),
        entry.data.kind()
    );
    println!(
        "  {}",
        logs::entry_path(&logs_dir, &entry.key).display().to_string().dimmed()
    );
    println!("  アップロード: modelship update --logs");
    Ok(())
}

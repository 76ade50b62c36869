//! プロジェクトドキュメントのローカル保存
//!
//! `.modelship/project.json` に保存する。保存のたびに前回のファイルを
//! `project.json.backup` に退避し、`lock.json` で同一プロジェクトへの
//! 同時実行を防ぐ。

use crate::error::{RegistryError, Result};
use crate::project::Project;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub const STATE_DIR: &str = ".modelship";
const PROJECT_FILE: &str = "project.json";
const PROJECT_BACKUP: &str = "project.json.backup";
const LOCK_FILE: &str = "lock.json";

/// ロックを古いとみなすまでの時間
const STALE_LOCK_HOURS: i64 = 1;

/// プロジェクトディレクトリ配下の保存先
#[derive(Debug, Clone)]
pub struct ProjectStore {
    project_root: PathBuf,
}

impl ProjectStore {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    pub fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    pub fn project_path(&self) -> PathBuf {
        self.state_dir().join(PROJECT_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(PROJECT_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    pub fn exists(&self) -> bool {
        self.project_path().exists()
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    pub async fn load(&self) -> Result<Project> {
        let project = Project::load_local(&self.project_path()).await?;
        tracing::debug!(
            project = %project.name,
            iterations = project.iterations().len(),
            "Loaded project"
        );
        Ok(project)
    }

    /// 前回のファイルをバックアップしてから保存する
    pub async fn save(&self, project: &Project) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.project_path();
        let backup = self.backup_path();

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
            tracing::debug!("Created project backup");
        }

        project.persist_local(&path).await
    }

    /// 排他ロックを取得する（1時間以上前のロックは破棄して取り直す）
    ///
    /// ロックファイルは `create_new` で作成するため、同時に呼ばれても
    /// 取得できるのは一方だけ。
    pub async fn acquire_lock(&self) -> Result<ProjectLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();
        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        let content = serde_json::to_string_pretty(&lock_info)?;

        // 古いロックを破棄した後に一度だけ取り直す
        for _ in 0..2 {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
                .await
            {
                Ok(mut file) => {
                    file.write_all(content.as_bytes()).await?;
                    file.flush().await?;
                    tracing::debug!("Acquired project lock");
                    return Ok(ProjectLock {
                        lock_path,
                        released: false,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    self.check_existing_lock(&lock_path).await?;
                    match fs::remove_file(&lock_path).await {
                        Ok(()) => {}
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(RegistryError::Locked(
            "他のプロセスがロックを取得しました".to_string(),
        ))
    }

    /// 既存のロックが有効なら `Locked` を返す
    async fn check_existing_lock(&self, lock_path: &Path) -> Result<()> {
        let content = match fs::read_to_string(lock_path).await {
            Ok(content) => content,
            // 確認中に解放された
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<LockInfo>(&content) {
            Ok(lock_info) => {
                let age = Utc::now().signed_duration_since(lock_info.acquired_at);
                if age.num_hours() < STALE_LOCK_HOURS {
                    return Err(RegistryError::Locked(format!(
                        "{} (pid {}) が {} から実行中です",
                        lock_info.holder, lock_info.pid, lock_info.acquired_at
                    )));
                }
                tracing::warn!("Removing stale lock from {}", lock_info.holder);
            }
            Err(e) => {
                // 書き込み途中のロックは更新時刻で判断する
                let modified = fs::metadata(lock_path).await?.modified()?;
                let age = modified.elapsed().unwrap_or_default();
                if age.as_secs() < (STALE_LOCK_HOURS as u64) * 3600 {
                    return Err(RegistryError::Locked(
                        "別のプロセスがロックを取得中です".to_string(),
                    ));
                }
                tracing::warn!("Removing unreadable lock file: {}", e);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// プロジェクトロックの RAII ガード
#[derive(Debug)]
pub struct ProjectLock {
    lock_path: PathBuf,
    released: bool,
}

impl ProjectLock {
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released project lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

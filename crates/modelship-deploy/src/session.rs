//! プロジェクト単位の実行セッション
//!
//! 1回の操作を「ロック取得 → 読み込み → 操作 → 保存 → リモート同期 → ロック解放」で
//! 包む。保存は操作が失敗しても必ず行うため、途中まで作成したリソースも
//! 次回の destroy から見える。

use crate::error::{DeployError, Result};
use crate::pipeline::{Pipeline, PipelineReport};
use crate::update::{UpdateActions, UpdateReport};
use modelship_cloud::{CloudProvider, DestroyReport};
use modelship_config::ProjectSettings;
use modelship_registry::{
    DestroyOrder, Iteration, Project, ProjectLock, ProjectStore, RemoteConfigService, Selection,
};
use tracing::{debug, info, warn};

/// リモート同期の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// リモートが設定されていない
    Skipped,
    Synced,
    Failed(String),
}

/// 操作結果とリモート同期結果
#[derive(Debug)]
pub struct Outcome<T> {
    pub value: T,
    pub sync: SyncStatus,
}

pub struct Session<'a> {
    store: ProjectStore,
    remote: Option<&'a dyn RemoteConfigService>,
}

impl<'a> Session<'a> {
    pub fn new(store: ProjectStore) -> Self {
        Self {
            store,
            remote: None,
        }
    }

    pub fn with_remote(mut self, remote: &'a dyn RemoteConfigService) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn store(&self) -> &ProjectStore {
        &self.store
    }

    /// プロジェクトを作成して最初の iteration を開く
    pub async fn init(&self, settings: &ProjectSettings) -> Result<Outcome<Project>> {
        if self.store.exists() {
            return Err(DeployError::Validation(format!(
                "プロジェクトは既に初期化されています: {}",
                self.store.project_path().display()
            )));
        }

        let lock = self.store.acquire_lock().await?;
        let mut project = Project::new(&settings.name, &settings.version, &settings.description);
        let result = project
            .begin_iteration(&settings.iteration)
            .map_err(DeployError::from);
        info!(project = %project.name, "Initialized project");

        let outcome = self.close(lock, &mut project, result).await?;
        Ok(Outcome {
            value: project,
            sync: outcome.sync,
        })
    }

    /// 読み込みのみ（ロックしない）
    pub async fn load(&self) -> Result<Project> {
        Ok(self.store.load().await?)
    }

    /// 計画とサービスコードの生成（プロジェクトは変更しない）
    pub async fn generate(&self, pipeline: &Pipeline<'_>) -> Result<PipelineReport> {
        let project = self.load().await?;
        pipeline.generate(&project).await
    }

    pub async fn deploy(&self, pipeline: &Pipeline<'_>) -> Result<Outcome<PipelineReport>> {
        let (lock, mut project) = self.open().await?;
        let result = pipeline.deploy(&mut project).await;
        self.close(lock, &mut project, result).await
    }

    pub async fn update(
        &self,
        pipeline: &Pipeline<'_>,
        actions: &UpdateActions,
    ) -> Result<Outcome<UpdateReport>> {
        let (lock, mut project) = self.open().await?;
        let result = pipeline.update(&mut project, actions).await;
        self.close(lock, &mut project, result).await
    }

    /// 指定（省略時は現在の）iteration のリソースを破棄する
    pub async fn destroy(
        &self,
        provider: &dyn CloudProvider,
        iteration_id: Option<&str>,
        selection: &Selection,
        order: DestroyOrder,
    ) -> Result<Outcome<DestroyReport>> {
        let (lock, mut project) = self.open().await?;
        let result = project
            .destroy(iteration_id, selection, provider, order)
            .await
            .map_err(DeployError::from);
        self.close(lock, &mut project, result).await
    }

    pub async fn prune(&self, iteration_id: &str) -> Result<Outcome<Iteration>> {
        let (lock, mut project) = self.open().await?;
        let result = project
            .prune_iteration(iteration_id)
            .map_err(DeployError::from);
        self.close(lock, &mut project, result).await
    }

    async fn open(&self) -> Result<(ProjectLock, Project)> {
        let lock = self.store.acquire_lock().await?;
        let project = self.store.load().await?;
        Ok((lock, project))
    }

    /// 結果にかかわらず保存・同期してからロックを解放する
    async fn close<T>(
        &self,
        lock: ProjectLock,
        project: &mut Project,
        result: Result<T>,
    ) -> Result<Outcome<T>> {
        let saved = self.store.save(project).await;
        let sync = match &saved {
            Ok(()) => self.sync(project).await,
            Err(_) => SyncStatus::Skipped,
        };

        if let Err(e) = lock.release().await {
            warn!("Failed to release project lock: {}", e);
        }

        match (result, saved) {
            (Ok(value), Ok(())) => Ok(Outcome { value, sync }),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), saved) => {
                if let Err(save_error) = saved {
                    warn!("Failed to persist project after error: {}", save_error);
                }
                Err(e)
            }
        }
    }

    async fn sync(&self, project: &mut Project) -> SyncStatus {
        let Some(remote) = self.remote else {
            return SyncStatus::Skipped;
        };

        let previous_id = project.id.clone();
        let result = project.sync_remote(remote).await;

        // 採番された ID は後続の失敗にかかわらずローカルに残す
        if project.id != previous_id {
            if let Err(e) = self.store.save(project).await {
                warn!("Failed to persist remote project id: {}", e);
            }
        }

        match result {
            Ok(()) => {
                debug!(remote_id = %project.id, "Synced project");
                SyncStatus::Synced
            }
            Err(e) => {
                warn!(project = %project.name, "Remote sync failed: {}", e);
                SyncStatus::Failed(e.to_string())
            }
        }
    }
}

//! Project — iteration 群と現在の iteration を束ねる集約ルート

use crate::error::{RegistryError, Result};
use crate::iteration::{DestroyOrder, Iteration, Selection, Status, generate_id};
use crate::remote::RemoteConfigService;
use crate::resource::ResourceRecord;
use modelship_cloud::{CloudProvider, DestroyReport};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;

/// プロジェクトドキュメントの形式バージョン
pub const DOCUMENT_VERSION: u32 = 1;

fn default_document_version() -> u32 {
    DOCUMENT_VERSION
}

/// デプロイ対象プロジェクト
///
/// `current_iteration_id` は空か `iterations` のキーのどちらか。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default = "default_document_version")]
    pub document_version: u32,

    /// リモート設定サービス上のID（初回同期まで空）
    #[serde(default)]
    pub id: String,

    pub name: String,
    pub version: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    iterations: BTreeMap<String, Iteration>,

    #[serde(default)]
    current_iteration_id: String,

    #[serde(default)]
    pub status: Status,

    #[serde(default)]
    pub service_api_url: Option<String>,
}

impl Project {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            document_version: DOCUMENT_VERSION,
            id: String::new(),
            name: name.into(),
            version: version.into(),
            description: description.into(),
            iterations: BTreeMap::new(),
            current_iteration_id: String::new(),
            status: Status::Inactive,
            service_api_url: None,
        }
    }

    pub fn iterations(&self) -> &BTreeMap<String, Iteration> {
        &self.iterations
    }

    pub fn iteration(&self, id: &str) -> Result<&Iteration> {
        self.iterations
            .get(id)
            .ok_or_else(|| RegistryError::IterationNotFound(id.to_string()))
    }

    pub fn iteration_mut(&mut self, id: &str) -> Result<&mut Iteration> {
        self.iterations
            .get_mut(id)
            .ok_or_else(|| RegistryError::IterationNotFound(id.to_string()))
    }

    pub fn current_iteration_id(&self) -> &str {
        &self.current_iteration_id
    }

    pub fn current_iteration(&self) -> Option<&Iteration> {
        self.iterations.get(&self.current_iteration_id)
    }

    pub fn current_iteration_mut(&mut self) -> Result<&mut Iteration> {
        let id = self.current_iteration_id.clone();
        self.iteration_mut(&id)
    }

    pub fn set_current_iteration(&mut self, id: &str) -> Result<()> {
        if !self.iterations.contains_key(id) {
            return Err(RegistryError::IterationNotFound(id.to_string()));
        }
        self.current_iteration_id = id.to_string();
        self.refresh_status();
        Ok(())
    }

    /// Iteration を追加する
    ///
    /// `resources` は永続化済みのレコード。各ハンドルを復元できなければ
    /// MalformedHandle で失敗し、プロジェクトは変更されない。
    pub fn add_iteration(
        &mut self,
        name: &str,
        version: Option<&str>,
        id: Option<&str>,
        resources: Vec<ResourceRecord>,
        set_current: bool,
    ) -> Result<&Iteration> {
        let id = match id {
            Some(id) => id.to_string(),
            None => loop {
                let candidate = generate_id();
                if !self.iterations.contains_key(&candidate) {
                    break candidate;
                }
            },
        };
        if self.iterations.contains_key(&id) {
            return Err(RegistryError::DuplicateIteration(id));
        }

        let mut iteration = Iteration::new(
            id.clone(),
            name,
            version.unwrap_or(self.version.as_str()).to_string(),
        );
        for record in resources {
            record.handle()?;
            iteration.insert_record(record)?;
        }

        tracing::info!(project = %self.name, iteration = %id, "Added iteration");
        self.iterations.insert(id.clone(), iteration);
        if set_current {
            self.current_iteration_id = id.clone();
        }
        self.refresh_status();

        self.iteration(&id)
    }

    /// デプロイ用の iteration を用意する
    ///
    /// 現在の iteration にリソースがあれば新しい iteration を開き、旧バージョンを
    /// 独立して破棄できるように残す。空ならそれを使い回す。
    pub fn begin_iteration(&mut self, name: &str) -> Result<String> {
        if let Some(current) = self.iterations.get_mut(&self.current_iteration_id) {
            if current.is_empty() {
                current.name = name.to_string();
                return Ok(current.id.clone());
            }
        }
        Ok(self.add_iteration(name, None, None, Vec::new(), true)?.id.clone())
    }

    /// 明示的に iteration を削除する（現在の iteration は削除できない）
    pub fn prune_iteration(&mut self, id: &str) -> Result<Iteration> {
        if id == self.current_iteration_id {
            return Err(RegistryError::InvalidDocument(format!(
                "現在の iteration '{}' は削除できません",
                id
            )));
        }
        self.iterations
            .remove(id)
            .ok_or_else(|| RegistryError::IterationNotFound(id.to_string()))
    }

    /// 現在の iteration にリソースがあり active なら active
    pub fn refresh_status(&mut self) {
        self.status = match self.current_iteration() {
            Some(current) if !current.is_empty() && current.status == Status::Active => {
                Status::Active
            }
            _ => Status::Inactive,
        };
    }

    /// 指定（省略時は現在の）iteration のリソースを破棄する
    pub async fn destroy(
        &mut self,
        iteration_id: Option<&str>,
        selection: &Selection,
        provider: &dyn CloudProvider,
        order: DestroyOrder,
    ) -> Result<DestroyReport> {
        let id = match iteration_id {
            Some(id) => id.to_string(),
            None if !self.current_iteration_id.is_empty() => self.current_iteration_id.clone(),
            None => return Err(RegistryError::IterationNotFound("(current)".to_string())),
        };
        let is_current = id == self.current_iteration_id;

        let iteration = self.iteration_mut(&id)?;
        let report = iteration.destroy(selection, provider, order).await?;
        if selection.is_full() {
            iteration.status = Status::Inactive;
        }
        let torn_down = iteration.status == Status::Inactive;

        if is_current && torn_down {
            self.service_api_url = None;
        }
        self.refresh_status();
        Ok(report)
    }

    /// ドキュメント（ネストした iteration / resource を含むスナップショット）
    pub fn to_document(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// ドキュメントから復元し、不変条件とハンドルを検証する
    pub fn from_document(document: serde_json::Value) -> Result<Self> {
        let project: Project = serde_json::from_value(document)?;
        project.validate()?;
        Ok(project)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let project: Project = serde_json::from_str(content)?;
        project.validate()?;
        Ok(project)
    }

    fn validate(&self) -> Result<()> {
        if self.document_version != DOCUMENT_VERSION {
            return Err(RegistryError::InvalidDocument(format!(
                "ドキュメントのバージョン {} はサポート外です (対応: {})",
                self.document_version, DOCUMENT_VERSION
            )));
        }

        if !self.current_iteration_id.is_empty()
            && !self.iterations.contains_key(&self.current_iteration_id)
        {
            return Err(RegistryError::InvalidDocument(format!(
                "current_iteration_id '{}' に対応する iteration がありません",
                self.current_iteration_id
            )));
        }

        for (key, iteration) in &self.iterations {
            if key != &iteration.id {
                return Err(RegistryError::InvalidDocument(format!(
                    "iteration キー '{}' と id '{}' が一致しません",
                    key, iteration.id
                )));
            }
            for (resource_key, record) in iteration.resources() {
                if resource_key != &record.id {
                    return Err(RegistryError::InvalidDocument(format!(
                        "resource キー '{}' と id '{}' が一致しません",
                        resource_key, record.id
                    )));
                }
                record.handle()?;
            }
        }
        Ok(())
    }

    /// ローカルファイルに書き出す
    pub async fn persist_local(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        fs::write(path, self.to_json()?).await?;
        tracing::debug!(path = %path.display(), "Persisted project");
        Ok(())
    }

    /// ローカルファイルから読み込む
    pub async fn load_local(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RegistryError::ProjectFileNotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path).await?;
        Self::from_json(&content)
    }

    /// リモート設定サービスへ送る（初回は作成して ID を受け取る）
    pub async fn sync_remote(&mut self, client: &dyn RemoteConfigService) -> Result<()> {
        if self.id.is_empty() {
            let id = client.create_project(&self.to_document()?).await?;
            tracing::info!(project = %self.name, remote_id = %id, "Created remote project");
            self.id = id;
            // サーバ側のドキュメントにも ID を反映する
            client.update_project(&self.id, &self.to_document()?).await?;
        } else {
            client.update_project(&self.id, &self.to_document()?).await?;
            tracing::info!(project = %self.name, remote_id = %self.id, "Updated remote project");
        }
        Ok(())
    }
}

//! 既存デプロイの更新
//!
//! 現在の iteration に登録済みのリソースをそのまま使い、モデル・ログ・
//! サービスコードを差し替える。新しい iteration は作らない。

use crate::error::{DeployError, Result};
use crate::naming::{ObjectKeys, slug};
use crate::pipeline::{Pipeline, ensure_authenticated};
use crate::target::validate_target;
use chrono::Utc;
use modelship_build::{ModelFramework, ServiceGenerator};
use modelship_cloud::{CloudError, ProviderHandle, ResourceKind};
use modelship_registry::{Iteration, Project};
use tracing::{info, warn};

/// 何を更新するか
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateActions {
    pub model: bool,
    pub logs: bool,
    /// サービスコードを再生成し、イメージを再ビルドして関数に反映する
    pub api: bool,
}

impl UpdateActions {
    pub fn is_empty(&self) -> bool {
        !(self.model || self.logs || self.api)
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateReport {
    pub iteration_id: String,
    pub uploaded: Vec<String>,
    pub image_uri: Option<String>,
    pub build_polls: Option<u32>,
    pub function_polls: Option<u32>,
}

/// 指定種別の最新リソースを (レコードID, ハンドル) で取り出す
fn registered(iteration: &Iteration, kind: ResourceKind) -> Result<(String, ProviderHandle)> {
    let record = iteration.latest(kind).ok_or_else(|| {
        DeployError::NotFound(format!(
            "iteration {} に {} リソースが登録されていません",
            iteration.id, kind
        ))
    })?;
    Ok((record.id.clone(), record.handle()?))
}

fn mismatch(id: &str, expected: ResourceKind) -> DeployError {
    CloudError::MalformedHandle(format!("{} は {} のハンドルではありません", id, expected)).into()
}

impl Pipeline<'_> {
    pub async fn update(&self, project: &mut Project, actions: &UpdateActions) -> Result<UpdateReport> {
        if actions.is_empty() {
            return Err(DeployError::Validation(
                "更新対象を --model / --logs / --api のいずれかで指定してください".to_string(),
            ));
        }
        validate_target(&self.options.target, self.provider.name())?;

        ensure_authenticated(self.provider).await?;

        let iteration = project.current_iteration().ok_or_else(|| {
            DeployError::NotFound("現在の iteration がありません。先に deploy してください".to_string())
        })?;
        let iteration_id = iteration.id.clone();

        let (store_id, store) = registered(iteration, ResourceKind::ObjectStore)?;
        let ProviderHandle::ObjectStore(store) = store else {
            return Err(mismatch(&store_id, ResourceKind::ObjectStore));
        };

        let project_slug = slug(&project.name);
        let keys = ObjectKeys::new(&project_slug, &self.options.model, Utc::now());
        let mut report = UpdateReport {
            iteration_id: iteration_id.clone(),
            ..Default::default()
        };

        if actions.model {
            if !self.options.model.is_file() {
                return Err(DeployError::Validation(format!(
                    "モデルファイルが見つかりません: {}",
                    self.options.model.display()
                )));
            }
            self.upload_model(&store, &keys).await?;
            report.uploaded.push(keys.model.clone());
            report.uploaded.push(keys.model_versioned.clone());
        }

        if actions.logs {
            match &self.options.logs_dir {
                Some(dir) if dir.is_dir() => {
                    let count = self.upload_logs(&store, &keys, dir).await?;
                    report.uploaded.push(format!("{} ({} files)", keys.logs_prefix, count));
                }
                Some(dir) => warn!(dir = %dir.display(), "Logs directory not found, skipping upload"),
                None => warn!("No logs directory configured, skipping upload"),
            }
        }

        if actions.api {
            let iteration = project.iteration(&iteration_id)?;
            let (build_id, build) = registered(iteration, ResourceKind::BuildProject)?;
            let ProviderHandle::BuildProject(build) = build else {
                return Err(mismatch(&build_id, ResourceKind::BuildProject));
            };
            let (registry_id, registry) = registered(iteration, ResourceKind::ImageRegistry)?;
            let ProviderHandle::ImageRegistry(registry) = registry else {
                return Err(mismatch(&registry_id, ResourceKind::ImageRegistry));
            };
            let (function_id, function_handle) = registered(iteration, ResourceKind::Function)?;
            let ProviderHandle::Function(function) = function_handle.clone() else {
                return Err(mismatch(&function_id, ResourceKind::Function));
            };

            let framework =
                ModelFramework::resolve(self.options.framework.as_deref(), &self.options.model)
                    .map_err(|e| DeployError::Validation(e.user_message()))?;
            let spec = self.service_spec(project, framework, &project_slug, &store.bucket_name, &keys);
            let service = ServiceGenerator::new()?.generate(&spec, &self.options.service_dir)?;
            self.upload_service(&store, &keys, &service).await?;
            report
                .uploaded
                .extend(service.files.iter().map(|f| keys.service_key(f)));

            report.build_polls = Some(self.build_image(&build).await?);
            let image_uri = self.provider.get_image_uri(&registry).await?;
            self.provider.update_function_image(&function, &image_uri).await?;
            report.function_polls = Some(self.wait_for_function(&function).await?);

            project
                .iteration_mut(&iteration_id)?
                .update_resource(&function_id, &function_handle)?;
            info!(function = %function.function_name, image = %image_uri, "Function image updated");
            report.image_uri = Some(image_uri);
        }

        info!(
            iteration = %iteration_id,
            uploaded = report.uploaded.len(),
            "Update finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_actions() {
        assert!(UpdateActions::default().is_empty());
        assert!(
            !UpdateActions {
                logs: true,
                ..Default::default()
            }
            .is_empty()
        );
    }
}

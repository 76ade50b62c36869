//! デプロイパイプライン
//!
//! `START → ROLE_READY → … → SCHEDULED → DONE` を順に実行する。各ステップで
//! 作成したリソースは次のステップへ進む前に現在の iteration に登録するため、
//! 途中で失敗しても作成済みのリソースは必ず destroy できる状態で残る。

use crate::error::{DeployError, Result, StepError};
use crate::naming::{NamePlan, ObjectKeys};
use crate::state::PipelineState;
use crate::target::validate_target;
use chrono::Utc;
use modelship_build::{GeneratedService, ModelFramework, ServiceGenerator, ServiceSpec};
use modelship_cloud::{
    ApiRef, BuildProjectRef, BuildStatus, CancelToken, CloudError, CloudProvider, FunctionRef,
    FunctionState, PollConfig, Progress, ProviderHandle, ResourceKind, StoreRef, poll_until,
};
use modelship_config::{PollSetting, Settings};
use modelship_registry::{Iteration, Project, RegistryError, Status};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 生成したサービスコードの出力先（プロジェクトルートからの相対パス）
pub const SERVICE_DIR: &str = ".modelship/service";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// プロバイダーを呼ばずに計画とサービスコードだけを作る
    Generate,
    Deploy,
}

/// パイプラインの入力
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub target: String,
    pub model: PathBuf,
    pub framework: Option<String>,
    pub logs_dir: Option<PathBuf>,
    pub service_dir: PathBuf,
    pub iteration_name: String,
    pub stage: String,
    pub keep_warm: Option<String>,
    pub build_poll: PollConfig,
    pub function_poll: PollConfig,
    /// 名前の suffix を再現したいときの乱数シード
    pub seed: Option<u64>,
}

impl PipelineOptions {
    pub fn from_settings(settings: &Settings, project_root: &Path) -> Result<Self> {
        let model = settings.model.as_ref().ok_or_else(|| {
            DeployError::Validation("modelship.kdl に model ノードがありません".to_string())
        })?;

        Ok(Self {
            target: settings.target.provider.clone(),
            model: project_root.join(&model.path),
            framework: model.framework.clone(),
            logs_dir: settings.logs.as_ref().map(|logs| project_root.join(logs)),
            service_dir: project_root.join(SERVICE_DIR),
            iteration_name: settings.project.iteration.clone(),
            stage: settings.target.stage.clone(),
            keep_warm: settings.target.keep_warm.clone(),
            build_poll: poll_config(settings.polling.build),
            function_poll: poll_config(settings.polling.function),
            seed: None,
        })
    }
}

fn poll_config(setting: PollSetting) -> PollConfig {
    PollConfig::new(Duration::from_secs(setting.interval_secs), setting.attempts)
}

/// 状態遷移の通知先
pub trait StepObserver: Send + Sync {
    /// `iteration` はデプロイ中の iteration（generate では None）
    fn on_transition(&self, state: PipelineState, iteration: Option<&Iteration>);
}

/// 作成予定のリソース
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedResource {
    pub state: PipelineState,
    pub kind: ResourceKind,
    pub name: String,
}

fn plan(names: &NamePlan, keep_warm: bool) -> Vec<PlannedResource> {
    let mut planned = vec![
        (PipelineState::RoleReady, ResourceKind::Role, &names.role),
        (
            PipelineState::RegistryReady,
            ResourceKind::ImageRegistry,
            &names.registry,
        ),
        (PipelineState::BucketReady, ResourceKind::ObjectStore, &names.bucket),
        (
            PipelineState::ImageBuilt,
            ResourceKind::BuildProject,
            &names.build_project,
        ),
        (PipelineState::FunctionReady, ResourceKind::Function, &names.function),
        (PipelineState::ApiCreated, ResourceKind::RestApi, &names.api),
    ];
    if keep_warm {
        planned.push((
            PipelineState::Scheduled,
            ResourceKind::ScheduleRule,
            &names.schedule_rule,
        ));
    }
    planned
        .into_iter()
        .map(|(state, kind, name)| PlannedResource {
            state,
            kind,
            name: name.clone(),
        })
        .collect()
}

/// パイプライン実行結果
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub mode: Mode,
    pub framework: ModelFramework,
    pub names: NamePlan,
    pub keys: ObjectKeys,
    pub planned: Vec<PlannedResource>,
    pub transitions: Vec<PipelineState>,
    pub iteration_id: Option<String>,
    pub service: Option<GeneratedService>,
    pub url: Option<String>,
    pub build_polls: Option<u32>,
    pub function_polls: Option<u32>,
}

/// 検証済みの実行準備
struct Prepared {
    framework: ModelFramework,
    names: NamePlan,
    keys: ObjectKeys,
}

impl Prepared {
    fn report(&self, mode: Mode, keep_warm: bool) -> PipelineReport {
        PipelineReport {
            mode,
            framework: self.framework,
            names: self.names.clone(),
            keys: self.keys.clone(),
            planned: plan(&self.names, keep_warm),
            transitions: Vec::new(),
            iteration_id: None,
            service: None,
            url: None,
            build_polls: None,
            function_polls: None,
        }
    }
}

/// 実行中の状態（どのステップを試行中か、どの iteration に登録するか）
struct Run<'p> {
    project: &'p mut Project,
    iteration_id: String,
    attempting: PipelineState,
    report: PipelineReport,
}

impl Run<'_> {
    fn iteration(&self) -> Option<&Iteration> {
        self.project.iteration(&self.iteration_id).ok()
    }

    fn iteration_mut(&mut self) -> std::result::Result<&mut Iteration, RegistryError> {
        self.project.iteration_mut(&self.iteration_id)
    }

    /// 作成直後のリソースを登録して ID を返す
    fn register(&mut self, handle: &ProviderHandle) -> std::result::Result<String, StepError> {
        let record = self.iteration_mut()?.add_resource(handle, None)?;
        Ok(record.id.clone())
    }

    fn registered(&self) -> Vec<String> {
        self.iteration()
            .map(|it| it.resources_in_order().iter().map(|r| r.id.clone()).collect())
            .unwrap_or_default()
    }

    fn advance(&mut self, state: PipelineState, observer: Option<&dyn StepObserver>) {
        info!(iteration = %self.iteration_id, state = %state, "Pipeline transition");
        self.report.transitions.push(state);
        if let Some(observer) = observer {
            observer.on_transition(state, self.iteration());
        }
    }
}

pub struct Pipeline<'a> {
    pub(crate) provider: &'a dyn CloudProvider,
    pub(crate) options: PipelineOptions,
    pub(crate) cancel: CancelToken,
    observer: Option<&'a dyn StepObserver>,
}

impl<'a> Pipeline<'a> {
    pub fn new(provider: &'a dyn CloudProvider, options: PipelineOptions) -> Self {
        Self {
            provider,
            options,
            cancel: CancelToken::never(),
            observer: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_observer(mut self, observer: &'a dyn StepObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn provider(&self) -> &'a dyn CloudProvider {
        self.provider
    }

    pub async fn run(&self, project: &mut Project, mode: Mode) -> Result<PipelineReport> {
        match mode {
            Mode::Generate => self.generate(project).await,
            Mode::Deploy => self.deploy(project).await,
        }
    }

    /// プロバイダー呼び出し前の検証
    fn prepare(&self, project: &Project) -> Result<Prepared> {
        validate_target(&self.options.target, self.provider.name())?;

        if !self.options.model.is_file() {
            return Err(DeployError::Validation(format!(
                "モデルファイルが見つかりません: {}",
                self.options.model.display()
            )));
        }
        let framework =
            ModelFramework::resolve(self.options.framework.as_deref(), &self.options.model)
                .map_err(|e| DeployError::Validation(e.user_message()))?;

        let names = NamePlan::generate(&project.name, self.options.seed)?;
        let keys = ObjectKeys::new(&names.slug, &self.options.model, Utc::now());
        debug!(?names, "Resolved resource names");

        Ok(Prepared {
            framework,
            names,
            keys,
        })
    }

    pub(crate) fn service_spec(
        &self,
        project: &Project,
        framework: ModelFramework,
        slug: &str,
        bucket: &str,
        keys: &ObjectKeys,
    ) -> ServiceSpec {
        ServiceSpec {
            project_name: project.name.clone(),
            slug: slug.to_string(),
            version: project.version.clone(),
            description: project.description.clone(),
            framework,
            bucket: bucket.to_string(),
            model_key: keys.model.clone(),
            logs_prefix: keys.logs_prefix.clone(),
            stage: self.options.stage.clone(),
        }
    }

    /// 計画とサービスコードだけを作る（iteration もリソースも作らない）
    pub async fn generate(&self, project: &Project) -> Result<PipelineReport> {
        let prepared = self.prepare(project)?;
        let mut report = prepared.report(Mode::Generate, self.options.keep_warm.is_some());

        for state in PipelineState::SEQUENCE {
            if state == PipelineState::ServiceCodeGenerated {
                let spec = self.service_spec(
                    project,
                    prepared.framework,
                    &prepared.names.slug,
                    &prepared.names.bucket,
                    &prepared.keys,
                );
                let service = ServiceGenerator::new()?.generate(&spec, &self.options.service_dir)?;
                report.service = Some(service);
            }
            debug!(state = %state, "Planned step");
            report.transitions.push(state);
            if let Some(observer) = self.observer {
                observer.on_transition(state, None);
            }
        }

        info!(
            project = %project.name,
            resources = report.planned.len(),
            "Generated deployment plan"
        );
        Ok(report)
    }

    /// 全ステップを実行する
    pub async fn deploy(&self, project: &mut Project) -> Result<PipelineReport> {
        let prepared = self.prepare(project)?;

        ensure_authenticated(self.provider).await?;

        let iteration_id = project.begin_iteration(&self.options.iteration_name)?;
        let mut report = prepared.report(Mode::Deploy, self.options.keep_warm.is_some());
        report.iteration_id = Some(iteration_id.clone());

        let mut run = Run {
            project,
            iteration_id,
            attempting: PipelineState::Start,
            report,
        };

        match self.execute(&mut run, &prepared).await {
            Ok(()) => Ok(run.report),
            Err(source) => {
                let state = run.attempting;
                let registered = run.registered();
                error!(
                    state = %state,
                    registered = registered.len(),
                    "Pipeline failed: {}",
                    source
                );
                run.advance(PipelineState::Failed, self.observer);
                Err(DeployError::StepFailed {
                    state,
                    registered,
                    source,
                })
            }
        }
    }

    async fn execute(
        &self,
        run: &mut Run<'_>,
        prepared: &Prepared,
    ) -> std::result::Result<(), StepError> {
        let provider = self.provider;
        let names = &prepared.names;
        let keys = &prepared.keys;
        let observer = self.observer;
        let description = if run.project.description.is_empty() {
            format!("{} inference API", run.project.name)
        } else {
            run.project.description.clone()
        };

        run.advance(PipelineState::Start, observer);

        run.attempting = PipelineState::RoleReady;
        let role = provider.create_execution_role(&names.role).await?;
        run.register(&ProviderHandle::Role(role.clone()))?;
        run.advance(PipelineState::RoleReady, observer);

        run.attempting = PipelineState::RegistryReady;
        let registry = provider.create_image_registry(&names.registry).await?;
        run.register(&ProviderHandle::ImageRegistry(registry.clone()))?;
        run.advance(PipelineState::RegistryReady, observer);

        run.attempting = PipelineState::BucketReady;
        let store = provider.create_object_store(&names.bucket).await?;
        run.register(&ProviderHandle::ObjectStore(store.clone()))?;
        run.advance(PipelineState::BucketReady, observer);

        run.attempting = PipelineState::ArtifactUploaded;
        self.upload_model(&store, keys).await?;
        if let Some(logs_dir) = &self.options.logs_dir {
            if logs_dir.is_dir() {
                self.upload_logs(&store, keys, logs_dir).await?;
            } else {
                warn!(dir = %logs_dir.display(), "Logs directory not found, skipping upload");
            }
        }
        run.advance(PipelineState::ArtifactUploaded, observer);

        run.attempting = PipelineState::ServiceCodeGenerated;
        let spec = self.service_spec(
            &*run.project,
            prepared.framework,
            &names.slug,
            &store.bucket_name,
            keys,
        );
        let service = ServiceGenerator::new()?.generate(&spec, &self.options.service_dir)?;
        self.upload_service(&store, keys, &service).await?;
        run.report.service = Some(service);
        run.advance(PipelineState::ServiceCodeGenerated, observer);

        run.attempting = PipelineState::ImageBuilt;
        let build = provider
            .create_build_project(
                &names.build_project,
                &role,
                &keys.build_source(&store.bucket_name),
                &registry,
            )
            .await?;
        run.register(&ProviderHandle::BuildProject(build.clone()))?;
        run.report.build_polls = Some(self.build_image(&build).await?);
        let image_uri = provider.get_image_uri(&registry).await?;
        info!(image = %image_uri, "Image built");
        run.advance(PipelineState::ImageBuilt, observer);

        run.attempting = PipelineState::FunctionReady;
        let function = provider
            .create_function(&names.function, &role, &image_uri)
            .await?;
        run.register(&ProviderHandle::Function(function.clone()))?;
        run.report.function_polls = Some(self.wait_for_function(&function).await?);
        run.advance(PipelineState::FunctionReady, observer);

        run.attempting = PipelineState::ApiCreated;
        let integration_uri = provider.function_integration_uri(&function);
        let api = provider
            .create_api(&names.api, &description, &integration_uri)
            .await?;
        let api_id = run.register(&ProviderHandle::RestApi(api.clone()))?;
        run.advance(PipelineState::ApiCreated, observer);

        run.attempting = PipelineState::PermissionsGranted;
        provider.grant_invoke_permission(&api, &function).await?;
        run.advance(PipelineState::PermissionsGranted, observer);

        run.attempting = PipelineState::ApiDeployed;
        let url = provider
            .create_deployment_stage(&api, &self.options.stage)
            .await?;
        let staged = ApiRef {
            stage: Some(self.options.stage.clone()),
            ..api
        };
        run.iteration_mut()?
            .update_resource(&api_id, &ProviderHandle::RestApi(staged))?;
        run.project.service_api_url = Some(url.clone());
        run.report.url = Some(url);
        run.advance(PipelineState::ApiDeployed, observer);

        run.attempting = PipelineState::Scheduled;
        if let Some(schedule) = &self.options.keep_warm {
            let rule = provider
                .create_schedule_rule(&names.schedule_rule, &function, schedule)
                .await?;
            run.register(&ProviderHandle::ScheduleRule(rule))?;
        }
        run.advance(PipelineState::Scheduled, observer);

        run.attempting = PipelineState::Done;
        run.iteration_mut()?.status = Status::Active;
        run.project.refresh_status();
        run.advance(PipelineState::Done, observer);

        Ok(())
    }

    pub(crate) async fn upload_model(
        &self,
        store: &StoreRef,
        keys: &ObjectKeys,
    ) -> std::result::Result<(), StepError> {
        let body = tokio::fs::read(&self.options.model).await?;
        for key in [&keys.model, &keys.model_versioned] {
            self.provider.upload_object(store, key, &body).await?;
            debug!(bucket = %store.bucket_name, key = %key, "Uploaded model");
        }
        Ok(())
    }

    pub(crate) async fn upload_logs(
        &self,
        store: &StoreRef,
        keys: &ObjectKeys,
        logs_dir: &Path,
    ) -> std::result::Result<usize, StepError> {
        let files = collect_files(logs_dir)?;
        for (relative, path) in &files {
            let body = tokio::fs::read(path).await?;
            self.provider
                .upload_object(store, &keys.log_key(relative), &body)
                .await?;
        }
        info!(count = files.len(), "Uploaded logs");
        Ok(files.len())
    }

    pub(crate) async fn upload_service(
        &self,
        store: &StoreRef,
        keys: &ObjectKeys,
        service: &GeneratedService,
    ) -> std::result::Result<(), StepError> {
        for relative in &service.files {
            let body = tokio::fs::read(service.dir.join(relative)).await?;
            self.provider
                .upload_object(store, &keys.service_key(relative), &body)
                .await?;
        }
        debug!(count = service.files.len(), "Uploaded service sources");
        Ok(())
    }

    /// ビルドを開始し、成功するまで待つ。ポーリング回数を返す。
    pub(crate) async fn build_image(
        &self,
        build: &BuildProjectRef,
    ) -> std::result::Result<u32, CloudError> {
        let provider = self.provider;
        let build_id = provider.start_build(build).await?;
        info!(build = %build_id, "Build started");

        let build_id = build_id.as_str();
        poll_until(
            PipelineState::ImageBuilt.as_str(),
            &self.options.build_poll,
            &self.cancel,
            move || async move {
                let status = provider.poll_build_status(build_id).await?;
                Ok(match status {
                    BuildStatus::Succeeded => Progress::Done(status.to_string()),
                    s if s.is_terminal_failure() => Progress::Failed(s.to_string()),
                    s => Progress::Pending(s.to_string()),
                })
            },
        )
        .await
    }

    /// 関数が Active になるまで待つ。ポーリング回数を返す。
    pub(crate) async fn wait_for_function(
        &self,
        function: &FunctionRef,
    ) -> std::result::Result<u32, CloudError> {
        let provider = self.provider;
        let function_name = function.function_name.as_str();
        poll_until(
            PipelineState::FunctionReady.as_str(),
            &self.options.function_poll,
            &self.cancel,
            move || async move {
                let state = provider.poll_function_state(function_name).await?;
                Ok(match state {
                    FunctionState::Active => Progress::Done(state.to_string()),
                    FunctionState::Failed => Progress::Failed(state.to_string()),
                    FunctionState::Pending => Progress::Pending(state.to_string()),
                })
            },
        )
        .await
    }
}

/// 認証情報が使えることを確認する
pub(crate) async fn ensure_authenticated(provider: &dyn CloudProvider) -> Result<()> {
    let auth = provider.check_auth().await?;
    if !auth.authenticated {
        return Err(CloudError::AuthenticationFailed(
            auth.error
                .unwrap_or_else(|| format!("{} credentials unavailable", provider.name())),
        )
        .into());
    }
    debug!(provider = provider.name(), account = ?auth.account_info, "Authenticated");
    Ok(())
}

/// ディレクトリ以下のファイルを (`/` 区切りの相対パス, 実パス) で返す
pub(crate) fn collect_files(dir: &Path) -> std::io::Result<Vec<(String, PathBuf)>> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<(String, PathBuf)>) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                walk(root, &path, out)?;
            } else if let Ok(relative) = path.strip_prefix(root) {
                let relative = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                out.push((relative, path));
            }
        }
        Ok(())
    }

    let mut files = Vec::new();
    walk(dir, dir, &mut files)?;
    files.sort();
    Ok(files)
}

#![allow(dead_code)]

use async_trait::async_trait;
use modelship_cloud::{
    ApiRef, AuthStatus, BuildProjectRef, BuildStatus, CloudError, CloudProvider, FunctionRef,
    FunctionState, PollConfig, ProviderHandle, RegistryRef, ResourceKind, ResourceStatus, Result,
    RoleRef, ScheduleRef, StoreRef,
};
use modelship_deploy::{PipelineOptions, PipelineState, StepObserver};
use modelship_registry::{Iteration, ProjectQuery, RemoteConfigService, RemoteError};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const ACCOUNT: &str = "123456789012";
const REGION: &str = "us-east-1";

/// Provider that records every call and answers polls from a script
pub struct ScriptedProvider {
    name: String,
    calls: Mutex<Vec<String>>,
    uploads: Mutex<Vec<String>>,
    destroyed: Mutex<Vec<String>>,
    build_statuses: Mutex<VecDeque<BuildStatus>>,
    function_states: Mutex<VecDeque<FunctionState>>,
    failing: HashSet<String>,
    unauthenticated: bool,
    builds: Mutex<u32>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            name: "aws".into(),
            calls: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            destroyed: Mutex::new(Vec::new()),
            build_statuses: Mutex::new(VecDeque::new()),
            function_states: Mutex::new(VecDeque::new()),
            failing: HashSet::new(),
            unauthenticated: false,
            builds: Mutex::new(0),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.into();
        self
    }

    /// Build statuses returned in order; SUCCEEDED once exhausted
    pub fn with_build_statuses(self, statuses: &[BuildStatus]) -> Self {
        *self.build_statuses.lock().unwrap() = statuses.iter().copied().collect();
        self
    }

    /// Function states returned in order; ACTIVE once exhausted
    pub fn with_function_states(self, states: &[FunctionState]) -> Self {
        *self.function_states.lock().unwrap() = states.iter().copied().collect();
        self
    }

    /// Make the named operation fail with a provider error
    pub fn failing_on(mut self, operation: &str) -> Self {
        self.failing.insert(operation.into());
        self
    }

    pub fn unauthenticated(mut self) -> Self {
        self.unauthenticated = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn destroyed(&self) -> Vec<String> {
        self.destroyed.lock().unwrap().clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == operation).count()
    }

    fn record(&self, operation: &str) -> Result<()> {
        self.calls.lock().unwrap().push(operation.to_string());
        if self.failing.contains(operation) {
            return Err(CloudError::CommandFailed(format!("{} failed", operation)));
        }
        Ok(())
    }
}

#[async_trait]
impl CloudProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &str {
        "Scripted"
    }

    fn region(&self) -> &str {
        REGION
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        self.record("check_auth")?;
        if self.unauthenticated {
            Ok(AuthStatus::failed("expired credentials"))
        } else {
            Ok(AuthStatus::ok(ACCOUNT))
        }
    }

    async fn create_execution_role(&self, name: &str) -> Result<RoleRef> {
        self.record("create_execution_role")?;
        Ok(RoleRef {
            role_name: name.into(),
            role_arn: format!("arn:aws:iam::{}:role/{}", ACCOUNT, name),
        })
    }

    async fn create_image_registry(&self, name: &str) -> Result<RegistryRef> {
        self.record("create_image_registry")?;
        Ok(RegistryRef {
            repository_name: name.into(),
            repository_uri: format!("{}.dkr.ecr.{}.amazonaws.com/{}", ACCOUNT, REGION, name),
            region: REGION.into(),
        })
    }

    async fn create_object_store(&self, name: &str) -> Result<StoreRef> {
        self.record("create_object_store")?;
        Ok(StoreRef {
            bucket_name: name.into(),
            region: REGION.into(),
        })
    }

    async fn upload_object(&self, _store: &StoreRef, key: &str, _body: &[u8]) -> Result<()> {
        self.record("upload_object")?;
        self.uploads.lock().unwrap().push(key.to_string());
        Ok(())
    }

    async fn create_build_project(
        &self,
        name: &str,
        _role: &RoleRef,
        _source_location: &str,
        _registry: &RegistryRef,
    ) -> Result<BuildProjectRef> {
        self.record("create_build_project")?;
        Ok(BuildProjectRef {
            project_name: name.into(),
            region: REGION.into(),
        })
    }

    async fn start_build(&self, project: &BuildProjectRef) -> Result<String> {
        self.record("start_build")?;
        let mut builds = self.builds.lock().unwrap();
        *builds += 1;
        Ok(format!("{}:build-{}", project.project_name, builds))
    }

    async fn poll_build_status(&self, _build_id: &str) -> Result<BuildStatus> {
        self.record("poll_build_status")?;
        Ok(self
            .build_statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(BuildStatus::Succeeded))
    }

    async fn get_image_uri(&self, registry: &RegistryRef) -> Result<String> {
        self.record("get_image_uri")?;
        Ok(format!("{}:latest", registry.repository_uri))
    }

    async fn create_function(
        &self,
        name: &str,
        _role: &RoleRef,
        _image_uri: &str,
    ) -> Result<FunctionRef> {
        self.record("create_function")?;
        Ok(FunctionRef {
            function_name: name.into(),
            function_arn: format!("arn:aws:lambda:{}:{}:function:{}", REGION, ACCOUNT, name),
            region: REGION.into(),
        })
    }

    async fn update_function_image(&self, _function: &FunctionRef, _image_uri: &str) -> Result<()> {
        self.record("update_function_image")
    }

    async fn poll_function_state(&self, _function_name: &str) -> Result<FunctionState> {
        self.record("poll_function_state")?;
        Ok(self
            .function_states
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(FunctionState::Active))
    }

    fn function_integration_uri(&self, function: &FunctionRef) -> String {
        format!("arn:aws:apigateway:{}:lambda:path/functions/{}/invocations", REGION, function.function_arn)
    }

    async fn create_api(
        &self,
        name: &str,
        _description: &str,
        _integration_uri: &str,
    ) -> Result<ApiRef> {
        self.record("create_api")?;
        Ok(ApiRef {
            rest_api_id: format!("api{}", name.len()),
            api_name: name.into(),
            stage: None,
            region: REGION.into(),
        })
    }

    async fn grant_invoke_permission(&self, _api: &ApiRef, _function: &FunctionRef) -> Result<()> {
        self.record("grant_invoke_permission")
    }

    async fn create_deployment_stage(&self, api: &ApiRef, stage: &str) -> Result<String> {
        self.record("create_deployment_stage")?;
        Ok(format!(
            "https://{}.execute-api.{}.amazonaws.com/{}",
            api.rest_api_id, REGION, stage
        ))
    }

    async fn create_schedule_rule(
        &self,
        name: &str,
        _target: &FunctionRef,
        _schedule_expression: &str,
    ) -> Result<ScheduleRef> {
        self.record("create_schedule_rule")?;
        Ok(ScheduleRef {
            rule_name: name.into(),
            rule_arn: format!("arn:aws:events:{}:{}:rule/{}", REGION, ACCOUNT, name),
            target_id: "1".into(),
            region: REGION.into(),
        })
    }

    async fn describe(&self, _handle: &ProviderHandle) -> Result<ResourceStatus> {
        self.record("describe")?;
        Ok(ResourceStatus::Active)
    }

    async fn destroy(&self, handle: &ProviderHandle) -> Result<()> {
        self.record("destroy")?;
        self.destroyed
            .lock()
            .unwrap()
            .push(handle.identifier().to_string());
        Ok(())
    }
}

/// Observer that snapshots the registered kinds at every transition
#[derive(Default)]
pub struct RecordingObserver {
    pub transitions: Mutex<Vec<(PipelineState, Vec<ResourceKind>)>>,
}

impl RecordingObserver {
    pub fn kinds_at(&self, state: PipelineState) -> Option<Vec<ResourceKind>> {
        self.transitions
            .lock()
            .unwrap()
            .iter()
            .find(|(s, _)| *s == state)
            .map(|(_, kinds)| kinds.clone())
    }

    pub fn states(&self) -> Vec<PipelineState> {
        self.transitions
            .lock()
            .unwrap()
            .iter()
            .map(|(s, _)| *s)
            .collect()
    }
}

impl StepObserver for RecordingObserver {
    fn on_transition(&self, state: PipelineState, iteration: Option<&Iteration>) {
        let kinds = iteration
            .map(|it| it.resources_in_order().iter().map(|r| r.kind()).collect())
            .unwrap_or_default();
        self.transitions.lock().unwrap().push((state, kinds));
    }
}

/// In-memory remote configuration service
#[derive(Default)]
pub struct MemoryRemote {
    pub documents: Mutex<HashMap<String, Value>>,
    pub fail: bool,
    /// Number of upcoming updates that fail after a successful create
    pub failing_updates: AtomicUsize,
    pub creates: AtomicUsize,
}

#[async_trait]
impl RemoteConfigService for MemoryRemote {
    async fn create_project(&self, document: &Value) -> std::result::Result<String, RemoteError> {
        if self.fail {
            return Err(RemoteError::Server("unavailable".into()));
        }
        self.creates.fetch_add(1, Ordering::SeqCst);
        let mut documents = self.documents.lock().unwrap();
        let id = format!("remote-{}", documents.len() + 1);
        documents.insert(id.clone(), document.clone());
        Ok(id)
    }

    async fn get_projects(&self, query: &ProjectQuery) -> std::result::Result<Vec<Value>, RemoteError> {
        let documents = self.documents.lock().unwrap();
        Ok(match query {
            ProjectQuery::Id(id) => documents.get(id).cloned().into_iter().collect(),
            ProjectQuery::Name(name) => documents
                .values()
                .filter(|d| d["name"] == name.as_str())
                .cloned()
                .collect(),
        })
    }

    async fn update_project(&self, id: &str, document: &Value) -> std::result::Result<(), RemoteError> {
        if self.fail {
            return Err(RemoteError::Server("unavailable".into()));
        }
        let pending = self
            .failing_updates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if pending.is_ok() {
            return Err(RemoteError::Server("blip".into()));
        }
        self.documents
            .lock()
            .unwrap()
            .insert(id.to_string(), document.clone());
        Ok(())
    }

    async fn delete_project(&self, id: &str) -> std::result::Result<(), RemoteError> {
        self.documents
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }
}

/// Project directory with a model file and a logs directory
pub fn project_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("model.pkl"), b"pickled").unwrap();
    std::fs::create_dir_all(dir.path().join("logs")).unwrap();
    std::fs::write(dir.path().join("logs/train.log"), "epoch 1 loss 0.3").unwrap();
    dir
}

pub fn options(root: &Path) -> PipelineOptions {
    PipelineOptions {
        target: "aws".into(),
        model: root.join("model.pkl"),
        framework: None,
        logs_dir: Some(root.join("logs")),
        service_dir: root.join(".modelship/service"),
        iteration_name: "baseline".into(),
        stage: "dev".into(),
        keep_warm: Some("rate(5 minutes)".into()),
        build_poll: PollConfig::new(Duration::from_millis(1), 5),
        function_poll: PollConfig::new(Duration::from_millis(1), 5),
        seed: Some(7),
    }
}

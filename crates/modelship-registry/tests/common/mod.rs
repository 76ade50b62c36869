use async_trait::async_trait;
use modelship_cloud::{
    ApiRef, AuthStatus, BuildProjectRef, BuildStatus, CloudError, CloudProvider, FunctionRef,
    FunctionState, ProviderHandle, RegistryRef, ResourceStatus, Result, RoleRef, ScheduleRef,
    StoreRef,
};
use std::collections::HashSet;
use std::sync::Mutex;

/// Destroy-only provider that records which handles it was asked to remove
#[derive(Default)]
pub struct MockProvider {
    pub destroyed: Mutex<Vec<String>>,
    pub auth_checks: Mutex<u32>,
    pub missing: HashSet<String>,
    pub failing: HashSet<String>,
    pub unauthenticated: bool,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn with_missing(mut self, identifier: &str) -> Self {
        self.missing.insert(identifier.to_string());
        self
    }

    #[allow(dead_code)]
    pub fn with_failing(mut self, identifier: &str) -> Self {
        self.failing.insert(identifier.to_string());
        self
    }

    #[allow(dead_code)]
    pub fn unauthenticated(mut self) -> Self {
        self.unauthenticated = true;
        self
    }

    pub fn destroyed(&self) -> Vec<String> {
        self.destroyed.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn auth_checks(&self) -> u32 {
        *self.auth_checks.lock().unwrap()
    }
}

fn unsupported<T>(op: &str) -> Result<T> {
    Err(CloudError::ApiError(format!("{} is not supported by the mock", op)))
}

#[async_trait]
impl CloudProvider for MockProvider {
    fn name(&self) -> &str {
        "aws"
    }

    fn display_name(&self) -> &str {
        "Mock"
    }

    fn region(&self) -> &str {
        "us-east-1"
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        *self.auth_checks.lock().unwrap() += 1;
        if self.unauthenticated {
            Ok(AuthStatus::failed("expired credentials"))
        } else {
            Ok(AuthStatus::ok("123456789012"))
        }
    }

    async fn create_execution_role(&self, _name: &str) -> Result<RoleRef> {
        unsupported("create_execution_role")
    }

    async fn create_image_registry(&self, _name: &str) -> Result<RegistryRef> {
        unsupported("create_image_registry")
    }

    async fn create_object_store(&self, _name: &str) -> Result<StoreRef> {
        unsupported("create_object_store")
    }

    async fn upload_object(&self, _store: &StoreRef, _key: &str, _body: &[u8]) -> Result<()> {
        unsupported("upload_object")
    }

    async fn create_build_project(
        &self,
        _name: &str,
        _role: &RoleRef,
        _source_location: &str,
        _registry: &RegistryRef,
    ) -> Result<BuildProjectRef> {
        unsupported("create_build_project")
    }

    async fn start_build(&self, _project: &BuildProjectRef) -> Result<String> {
        unsupported("start_build")
    }

    async fn poll_build_status(&self, _build_id: &str) -> Result<BuildStatus> {
        unsupported("poll_build_status")
    }

    async fn get_image_uri(&self, _registry: &RegistryRef) -> Result<String> {
        unsupported("get_image_uri")
    }

    async fn create_function(
        &self,
        _name: &str,
        _role: &RoleRef,
        _image_uri: &str,
    ) -> Result<FunctionRef> {
        unsupported("create_function")
    }

    async fn update_function_image(&self, _function: &FunctionRef, _image_uri: &str) -> Result<()> {
        unsupported("update_function_image")
    }

    async fn poll_function_state(&self, _function_name: &str) -> Result<FunctionState> {
        unsupported("poll_function_state")
    }

    fn function_integration_uri(&self, function: &FunctionRef) -> String {
        format!("mock://{}", function.function_name)
    }

    async fn create_api(
        &self,
        _name: &str,
        _description: &str,
        _integration_uri: &str,
    ) -> Result<ApiRef> {
        unsupported("create_api")
    }

    async fn grant_invoke_permission(&self, _api: &ApiRef, _function: &FunctionRef) -> Result<()> {
        unsupported("grant_invoke_permission")
    }

    async fn create_deployment_stage(&self, _api: &ApiRef, _stage: &str) -> Result<String> {
        unsupported("create_deployment_stage")
    }

    async fn create_schedule_rule(
        &self,
        _name: &str,
        _target: &FunctionRef,
        _schedule_expression: &str,
    ) -> Result<ScheduleRef> {
        unsupported("create_schedule_rule")
    }

    async fn describe(&self, handle: &ProviderHandle) -> Result<ResourceStatus> {
        if self.missing.contains(handle.identifier()) {
            return Err(CloudError::ResourceNotFound(handle.identifier().to_string()));
        }
        Ok(ResourceStatus::Active)
    }

    async fn destroy(&self, handle: &ProviderHandle) -> Result<()> {
        let id = handle.identifier().to_string();
        if self.missing.contains(&id) {
            return Err(CloudError::ResourceNotFound(id));
        }
        if self.failing.contains(&id) {
            return Err(CloudError::CommandFailed(format!("cannot delete {}", id)));
        }
        self.destroyed.lock().unwrap().push(id);
        Ok(())
    }
}

pub fn role(name: &str) -> ProviderHandle {
    ProviderHandle::Role(RoleRef {
        role_name: name.into(),
        role_arn: format!("arn:aws:iam::123456789012:role/{}", name),
    })
}

pub fn bucket(name: &str) -> ProviderHandle {
    ProviderHandle::ObjectStore(StoreRef {
        bucket_name: name.into(),
        region: "us-east-1".into(),
    })
}

pub fn registry(name: &str) -> ProviderHandle {
    ProviderHandle::ImageRegistry(RegistryRef {
        repository_name: name.into(),
        repository_uri: format!("123456789012.dkr.ecr.us-east-1.amazonaws.com/{}", name),
        region: "us-east-1".into(),
    })
}

pub fn function(name: &str) -> ProviderHandle {
    ProviderHandle::Function(FunctionRef {
        function_name: name.into(),
        function_arn: format!("arn:aws:lambda:us-east-1:123456789012:function:{}", name),
        region: "us-east-1".into(),
    })
}

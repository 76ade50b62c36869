mod common;

use common::{RecordingObserver, ScriptedProvider, options, project_dir};
use modelship_cloud::{BuildStatus, FunctionState, ResourceKind, cancel_pair};
use modelship_deploy::{ErrorKind, Mode, Pipeline, PipelineState};
use modelship_registry::{DestroyOrder, Project, Selection, Status};

fn project() -> Project {
    Project::new("Demo Model", "0.1.0", "Iris classifier")
}

#[tokio::test]
async fn test_deploy_registers_each_resource_before_the_next_step() {
    let dir = project_dir();
    let provider = ScriptedProvider::new();
    let observer = RecordingObserver::default();
    let pipeline = Pipeline::new(&provider, options(dir.path())).with_observer(&observer);

    let mut project = project();
    let report = pipeline.deploy(&mut project).await.unwrap();

    assert_eq!(report.transitions, PipelineState::SEQUENCE.to_vec());
    assert_eq!(observer.states(), PipelineState::SEQUENCE.to_vec());
    assert_eq!(
        observer.kinds_at(PipelineState::FunctionReady).unwrap(),
        vec![
            ResourceKind::Role,
            ResourceKind::ImageRegistry,
            ResourceKind::ObjectStore,
            ResourceKind::BuildProject,
            ResourceKind::Function,
        ]
    );
    assert_eq!(
        observer.kinds_at(PipelineState::RoleReady).unwrap(),
        vec![ResourceKind::Role]
    );

    let iteration = project.current_iteration().unwrap();
    assert_eq!(iteration.len(), 7);
    assert_eq!(iteration.status, Status::Active);
    assert_eq!(project.status, Status::Active);
    assert_eq!(report.iteration_id.as_deref(), Some(iteration.id.as_str()));

    let url = report.url.unwrap();
    assert!(url.ends_with("/dev"));
    assert_eq!(project.service_api_url.as_deref(), Some(url.as_str()));

    let api = iteration.latest_handle(ResourceKind::RestApi).unwrap();
    let modelship_cloud::ProviderHandle::RestApi(api) = api else {
        panic!("expected an API handle");
    };
    assert_eq!(api.stage.as_deref(), Some("dev"));
}

#[tokio::test]
async fn test_deploy_uploads_model_logs_and_service() {
    let dir = project_dir();
    let provider = ScriptedProvider::new();
    let pipeline = Pipeline::new(&provider, options(dir.path()));

    let mut project = project();
    let report = pipeline.deploy(&mut project).await.unwrap();

    let uploads = provider.uploads();
    assert!(uploads.contains(&"demomodel/model.pkl".to_string()));
    assert!(uploads.contains(&report.keys.model_versioned));
    assert!(uploads.contains(&"demomodel/logs/train.log".to_string()));
    assert!(uploads.contains(&"demomodel/service/main.py".to_string()));
    assert!(uploads.contains(&"demomodel/service/Dockerfile".to_string()));

    let service = report.service.unwrap();
    assert!(service.dir.join("buildspec.yml").exists());
}

#[tokio::test]
async fn test_names_come_from_project_name_and_one_suffix() {
    let dir = project_dir();
    let provider = ScriptedProvider::new();
    let pipeline = Pipeline::new(&provider, options(dir.path()));

    let mut project = project();
    let report = pipeline.deploy(&mut project).await.unwrap();

    let suffix = &report.names.suffix;
    assert_eq!(suffix.len(), 6);
    assert_eq!(report.names.function, format!("demomodel-{}", suffix));
    assert_eq!(report.names.bucket, format!("demomodel-{}", suffix));
    assert_eq!(report.names.api, format!("demomodel-api-{}", suffix));

    let function = project
        .current_iteration()
        .unwrap()
        .latest_handle(ResourceKind::Function)
        .unwrap();
    assert_eq!(function.identifier(), report.names.function);
}

#[tokio::test]
async fn test_build_is_polled_until_it_succeeds() {
    let dir = project_dir();
    let provider = ScriptedProvider::new().with_build_statuses(&[
        BuildStatus::InProgress,
        BuildStatus::InProgress,
        BuildStatus::Succeeded,
    ]);
    let pipeline = Pipeline::new(&provider, options(dir.path()));

    let mut project = project();
    let report = pipeline.deploy(&mut project).await.unwrap();

    assert_eq!(report.build_polls, Some(3));
    assert_eq!(provider.count("poll_build_status"), 3);
    assert_eq!(report.function_polls, Some(1));
}

#[tokio::test]
async fn test_definitive_build_failure_stops_polling() {
    let dir = project_dir();
    let provider = ScriptedProvider::new()
        .with_build_statuses(&[BuildStatus::InProgress, BuildStatus::Failed]);
    let observer = RecordingObserver::default();
    let pipeline = Pipeline::new(&provider, options(dir.path())).with_observer(&observer);

    let mut project = project();
    let err = pipeline.deploy(&mut project).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DefinitiveFailure);
    assert_eq!(provider.count("poll_build_status"), 2);
    assert_eq!(provider.count("create_function"), 0);

    let (state, registered) = err.failed_step().unwrap();
    assert_eq!(state, PipelineState::ImageBuilt);
    assert_eq!(registered.len(), 4);

    // 作成済みのリソースは残り、destroy できる
    let iteration = project.current_iteration().unwrap();
    let ids: Vec<&str> = iteration
        .resources_in_order()
        .iter()
        .map(|r| r.id.as_str())
        .collect();
    assert_eq!(ids, registered.iter().map(String::as_str).collect::<Vec<_>>());
    assert_eq!(iteration.status, Status::Inactive);
    assert_eq!(observer.states().last(), Some(&PipelineState::Failed));
}

#[tokio::test]
async fn test_function_that_never_activates_times_out() {
    let dir = project_dir();
    let provider = ScriptedProvider::new().with_function_states(&[FunctionState::Pending; 5]);
    let pipeline = Pipeline::new(&provider, options(dir.path()));

    let mut project = project();
    let err = pipeline.deploy(&mut project).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(provider.count("poll_function_state"), 5);
    let (state, registered) = err.failed_step().unwrap();
    assert_eq!(state, PipelineState::FunctionReady);
    assert_eq!(registered.len(), 5);
    assert!(project.service_api_url.is_none());
}

#[tokio::test]
async fn test_failed_function_is_definitive() {
    let dir = project_dir();
    let provider = ScriptedProvider::new()
        .with_function_states(&[FunctionState::Pending, FunctionState::Failed]);
    let pipeline = Pipeline::new(&provider, options(dir.path()));

    let err = pipeline.deploy(&mut project()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DefinitiveFailure);
    assert_eq!(provider.count("poll_function_state"), 2);
}

#[tokio::test]
async fn test_provider_error_reports_the_attempted_step() {
    let dir = project_dir();
    let provider = ScriptedProvider::new().failing_on("grant_invoke_permission");
    let pipeline = Pipeline::new(&provider, options(dir.path()));

    let mut project = project();
    let err = pipeline.deploy(&mut project).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Provider);
    let (state, registered) = err.failed_step().unwrap();
    assert_eq!(state, PipelineState::PermissionsGranted);
    assert_eq!(registered.len(), 6);
}

#[tokio::test]
async fn test_cancelled_build_wait() {
    let dir = project_dir();
    let provider = ScriptedProvider::new().with_build_statuses(&[BuildStatus::InProgress; 5]);
    let (handle, token) = cancel_pair();
    handle.cancel();
    let pipeline = Pipeline::new(&provider, options(dir.path())).with_cancel(token);

    let err = pipeline.deploy(&mut project()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(err.failed_step().unwrap().0, PipelineState::ImageBuilt);
    assert_eq!(provider.count("poll_build_status"), 0);
}

#[tokio::test]
async fn test_without_keep_warm_no_schedule_rule_is_created() {
    let dir = project_dir();
    let provider = ScriptedProvider::new();
    let mut opts = options(dir.path());
    opts.keep_warm = None;
    let pipeline = Pipeline::new(&provider, opts);

    let mut project = project();
    let report = pipeline.deploy(&mut project).await.unwrap();

    assert_eq!(provider.count("create_schedule_rule"), 0);
    assert_eq!(report.planned.len(), 6);
    assert_eq!(project.current_iteration().unwrap().len(), 6);
    assert!(report.transitions.contains(&PipelineState::Scheduled));
}

#[tokio::test]
async fn test_second_deploy_opens_a_new_iteration() {
    let dir = project_dir();
    let provider = ScriptedProvider::new();
    let mut project = project();

    let first = Pipeline::new(&provider, options(dir.path()))
        .deploy(&mut project)
        .await
        .unwrap();
    let mut opts = options(dir.path());
    opts.seed = Some(11);
    let second = Pipeline::new(&provider, opts)
        .deploy(&mut project)
        .await
        .unwrap();

    let first_id = first.iteration_id.unwrap();
    let second_id = second.iteration_id.unwrap();
    assert_ne!(first_id, second_id);
    assert_eq!(project.iterations().len(), 2);
    assert_eq!(project.current_iteration_id(), second_id);

    let report = project
        .destroy(
            Some(&first_id),
            &Selection::all(),
            &provider,
            DestroyOrder::ReverseCreation,
        )
        .await
        .unwrap();
    assert_eq!(report.destroyed.len(), 7);
    assert!(provider.destroyed().iter().all(|id| !id.contains(&second.names.suffix)));

    assert!(project.iteration(&first_id).unwrap().is_empty());
    assert_eq!(project.current_iteration().unwrap().len(), 7);
    assert_eq!(project.status, Status::Active);
}

#[tokio::test]
async fn test_unsupported_target_fails_before_any_provider_call() {
    let dir = project_dir();
    let provider = ScriptedProvider::new();
    let mut opts = options(dir.path());
    opts.target = "gcp".into();

    let mut project = project();
    let err = Pipeline::new(&provider, opts)
        .deploy(&mut project)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(provider.calls().is_empty());
    assert!(project.iterations().is_empty());
}

#[tokio::test]
async fn test_target_must_match_provider() {
    let dir = project_dir();
    let provider = ScriptedProvider::new().named("azure");

    let err = Pipeline::new(&provider, options(dir.path()))
        .deploy(&mut project())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_missing_model_is_a_validation_error() {
    let dir = project_dir();
    let provider = ScriptedProvider::new();
    let mut opts = options(dir.path());
    opts.model = dir.path().join("missing.pkl");

    let err = Pipeline::new(&provider, opts)
        .deploy(&mut project())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_unauthenticated_provider_opens_no_iteration() {
    let dir = project_dir();
    let provider = ScriptedProvider::new().unauthenticated();

    let mut project = project();
    let err = Pipeline::new(&provider, options(dir.path()))
        .deploy(&mut project)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert_eq!(provider.calls(), vec!["check_auth".to_string()]);
    assert!(project.iterations().is_empty());
}

#[tokio::test]
async fn test_generate_mode_touches_nothing() {
    let dir = project_dir();
    let provider = ScriptedProvider::new();
    let observer = RecordingObserver::default();
    let pipeline = Pipeline::new(&provider, options(dir.path())).with_observer(&observer);

    let mut project = project();
    let before = project.clone();
    let report = pipeline.run(&mut project, Mode::Generate).await.unwrap();

    assert_eq!(report.mode, Mode::Generate);
    assert!(provider.calls().is_empty());
    assert_eq!(project, before);
    assert!(report.iteration_id.is_none());
    assert_eq!(report.planned.len(), 7);
    assert_eq!(report.transitions, PipelineState::SEQUENCE.to_vec());
    assert!(observer.kinds_at(PipelineState::Done).unwrap().is_empty());

    let service = report.service.unwrap();
    assert!(service.dir.join("main.py").exists());
    assert!(service.dir.join("app/model.py").exists());
}

//! パイプラインの状態

use serde::{Deserialize, Serialize};
use std::fmt;

/// デプロイパイプラインの状態（線形、失敗時のみ FAILED へ）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Start,
    RoleReady,
    RegistryReady,
    BucketReady,
    ArtifactUploaded,
    ServiceCodeGenerated,
    ImageBuilt,
    FunctionReady,
    ApiCreated,
    PermissionsGranted,
    ApiDeployed,
    Scheduled,
    Done,
    Failed,
}

impl PipelineState {
    /// START から DONE までの成功時の順序
    pub const SEQUENCE: [PipelineState; 13] = [
        PipelineState::Start,
        PipelineState::RoleReady,
        PipelineState::RegistryReady,
        PipelineState::BucketReady,
        PipelineState::ArtifactUploaded,
        PipelineState::ServiceCodeGenerated,
        PipelineState::ImageBuilt,
        PipelineState::FunctionReady,
        PipelineState::ApiCreated,
        PipelineState::PermissionsGranted,
        PipelineState::ApiDeployed,
        PipelineState::Scheduled,
        PipelineState::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Start => "START",
            PipelineState::RoleReady => "ROLE_READY",
            PipelineState::RegistryReady => "REGISTRY_READY",
            PipelineState::BucketReady => "BUCKET_READY",
            PipelineState::ArtifactUploaded => "ARTIFACT_UPLOADED",
            PipelineState::ServiceCodeGenerated => "SERVICE_CODE_GENERATED",
            PipelineState::ImageBuilt => "IMAGE_BUILT",
            PipelineState::FunctionReady => "FUNCTION_READY",
            PipelineState::ApiCreated => "API_CREATED",
            PipelineState::PermissionsGranted => "PERMISSIONS_GRANTED",
            PipelineState::ApiDeployed => "API_DEPLOYED",
            PipelineState::Scheduled => "SCHEDULED",
            PipelineState::Done => "DONE",
            PipelineState::Failed => "FAILED",
        }
    }

    /// 進捗表示用の説明
    pub fn label(&self) -> &'static str {
        match self {
            PipelineState::Start => "デプロイを開始",
            PipelineState::RoleReady => "実行ロールを作成",
            PipelineState::RegistryReady => "イメージレジストリを作成",
            PipelineState::BucketReady => "バケットを作成",
            PipelineState::ArtifactUploaded => "モデルをアップロード",
            PipelineState::ServiceCodeGenerated => "サービスコードを生成",
            PipelineState::ImageBuilt => "イメージをビルド",
            PipelineState::FunctionReady => "関数を作成",
            PipelineState::ApiCreated => "APIを作成",
            PipelineState::PermissionsGranted => "呼び出し権限を付与",
            PipelineState::ApiDeployed => "APIをデプロイ",
            PipelineState::Scheduled => "ウォームアップを設定",
            PipelineState::Done => "完了",
            PipelineState::Failed => "失敗",
        }
    }

    /// 1始まりの段階番号（FAILED は None）
    pub fn step_number(&self) -> Option<usize> {
        Self::SEQUENCE.iter().position(|s| s == self).map(|i| i + 1)
    }

    /// 次の状態（DONE / FAILED は None）
    pub fn next(&self) -> Option<PipelineState> {
        let index = Self::SEQUENCE.iter().position(|s| s == self)?;
        Self::SEQUENCE.get(index + 1).copied()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

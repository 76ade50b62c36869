//! 登録済みリソースの状態確認

use crate::error::Result;
use crate::pipeline::ensure_authenticated;
use modelship_cloud::{Capability, CloudProvider, ResourceKind, ResourceStatus};
use modelship_registry::Iteration;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveState {
    Known(ResourceStatus),
    /// ハンドルが読めない、またはプロバイダーへの問い合わせに失敗した
    Unknown(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct LiveResource {
    pub id: String,
    pub kind: ResourceKind,
    pub identifier: Option<String>,
    pub state: LiveState,
}

/// iteration の各リソースをプロバイダーに問い合わせる（作成順）
///
/// 認証は最初に1回だけ確認する。個別の問い合わせ失敗は `Unknown` として返す。
pub async fn live_status(
    iteration: &Iteration,
    provider: &dyn CloudProvider,
) -> Result<Vec<LiveResource>> {
    ensure_authenticated(provider).await?;

    let mut resources = Vec::with_capacity(iteration.len());
    for record in iteration.resources_in_order() {
        let (identifier, state) = match record.handle() {
            Ok(handle) => {
                let identifier = handle.identifier().to_string();
                let state = match Capability::bind(handle, provider).describe().await {
                    Ok(status) => LiveState::Known(status),
                    Err(e) => {
                        warn!(resource = %record.id, "Failed to describe resource: {}", e);
                        LiveState::Unknown(e.to_string())
                    }
                };
                (Some(identifier), state)
            }
            Err(e) => (None, LiveState::Unknown(e.to_string())),
        };

        resources.push(LiveResource {
            id: record.id.clone(),
            kind: record.kind(),
            identifier,
            state,
        });
    }
    Ok(resources)
}

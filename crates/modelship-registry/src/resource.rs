//! 登録済みリソースのレコード

use crate::error::Result;
use chrono::{DateTime, Utc};
use modelship_cloud::{ProviderHandle, ResourceKind};
use serde::{Deserialize, Serialize};

/// Iteration に登録された1リソース
///
/// `provider_handle` には識別子（バケット名、関数名、REST API id など）だけを保持する。
/// ライブなクライアントや認証情報は含めない。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Iteration 内で一意なID
    pub id: String,

    /// リソース種別タグ（"S3", "AWSLambda", ...）
    pub name: ResourceKind,

    /// Iteration 内での作成順
    pub sequence: u64,

    /// 最小限の識別情報
    pub provider_handle: serde_json::Value,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResourceRecord {
    pub(crate) fn new(id: String, handle: &ProviderHandle, sequence: u64) -> Result<Self> {
        handle.validate()?;
        let now = Utc::now();
        Ok(Self {
            id,
            name: handle.kind(),
            sequence,
            provider_handle: handle.to_value()?,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn kind(&self) -> ResourceKind {
        self.name
    }

    /// 型付きハンドルへ復元する（不正なら MalformedHandle）
    pub fn handle(&self) -> Result<ProviderHandle> {
        Ok(ProviderHandle::from_value(self.name, &self.provider_handle)?)
    }

    /// id または種別タグで一致するか
    pub fn matches(&self, selector: &str) -> bool {
        self.id == selector || self.name.matches(selector)
    }
}

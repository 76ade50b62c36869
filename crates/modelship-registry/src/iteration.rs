//! Iteration — 1回のデプロイで作成されたリソースのレジストリ

use crate::error::{RegistryError, Result};
use crate::resource::ResourceRecord;
use chrono::{DateTime, Utc};
use modelship_cloud::{
    Capability, CloudError, CloudProvider, DestroyOutcome, DestroyReport, ProviderHandle,
    ResourceKind,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

const ID_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const ID_LENGTH: usize = 8;

/// 英小文字と数字からなるランダムID
pub fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_LENGTH)
        .map(|_| ID_CHARSET[rng.gen_range(0..ID_CHARSET.len())] as char)
        .collect()
}

/// Project / Iteration の稼働状態
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Inactive,
    Active,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Inactive => write!(f, "inactive"),
            Status::Active => write!(f, "active"),
        }
    }
}

/// 破棄する順序
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DestroyOrder {
    /// 作成の逆順（依存される側を最後に消す）
    #[default]
    ReverseCreation,
    /// 作成順
    Creation,
}

impl FromStr for DestroyOrder {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "reverse-creation" | "reverse" => Ok(DestroyOrder::ReverseCreation),
            "creation" => Ok(DestroyOrder::Creation),
            other => Err(RegistryError::InvalidDocument(format!(
                "不明な destroy order: {}",
                other
            ))),
        }
    }
}

/// destroy 対象の選択
///
/// `includes` が空でなければ一致したものだけ、空なら `excludes` に一致しないもの全て。
/// 一致は resource id または種別タグ。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub includes: BTreeSet<String>,
    pub excludes: BTreeSet<String>,
}

impl Selection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn including<I, S>(selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            includes: selectors.into_iter().map(Into::into).collect(),
            excludes: BTreeSet::new(),
        }
    }

    pub fn excluding<I, S>(selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            includes: BTreeSet::new(),
            excludes: selectors.into_iter().map(Into::into).collect(),
        }
    }

    /// includes / excludes どちらも無い = 全リソース
    pub fn is_full(&self) -> bool {
        self.includes.is_empty() && self.excludes.is_empty()
    }

    pub fn selects(&self, record: &ResourceRecord) -> bool {
        if !self.includes.is_empty() {
            self.includes.iter().any(|s| record.matches(s))
        } else {
            !self.excludes.iter().any(|s| record.matches(s))
        }
    }
}

/// 1回のデプロイ（バージョン）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iteration {
    pub id: String,
    pub name: String,
    pub version: String,
    resources: BTreeMap<String, ResourceRecord>,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Iteration {
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            resources: BTreeMap::new(),
            status: Status::Inactive,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn resources(&self) -> &BTreeMap<String, ResourceRecord> {
        &self.resources
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// 作成順に並べたリソース
    pub fn resources_in_order(&self) -> Vec<&ResourceRecord> {
        let mut records: Vec<&ResourceRecord> = self.resources.values().collect();
        records.sort_by_key(|r| r.sequence);
        records
    }

    pub fn get(&self, id: &str) -> Option<&ResourceRecord> {
        self.resources.get(id)
    }

    /// id または種別タグで最初（作成順）に一致するリソース
    pub fn find(&self, selector: &str) -> Option<&ResourceRecord> {
        self.resources_in_order()
            .into_iter()
            .find(|r| r.matches(selector))
    }

    /// 指定種別で最後に作成されたリソース
    pub fn latest(&self, kind: ResourceKind) -> Option<&ResourceRecord> {
        self.resources_in_order()
            .into_iter()
            .rev()
            .find(|r| r.kind() == kind)
    }

    /// 指定種別の最新のハンドル
    pub fn latest_handle(&self, kind: ResourceKind) -> Result<ProviderHandle> {
        self.latest(kind)
            .ok_or_else(|| RegistryError::ResourceNotFound(format!("{} ({})", kind, self.id)))?
            .handle()
    }

    fn next_sequence(&self) -> u64 {
        self.resources
            .values()
            .map(|r| r.sequence + 1)
            .max()
            .unwrap_or(0)
    }

    /// リソースを登録する。id を省略するとランダムIDを割り当てる。
    pub fn add_resource(
        &mut self,
        handle: &ProviderHandle,
        id: Option<&str>,
    ) -> Result<&ResourceRecord> {
        let id = match id {
            Some(id) => id.to_string(),
            None => loop {
                let candidate = generate_id();
                if !self.resources.contains_key(&candidate) {
                    break candidate;
                }
            },
        };

        if self.resources.contains_key(&id) {
            return Err(RegistryError::DuplicateResource(id));
        }

        let record = ResourceRecord::new(id.clone(), handle, self.next_sequence())?;
        self.updated_at = record.updated_at;
        tracing::info!(iteration = %self.id, resource = %id, kind = %record.name, "Registered resource");

        Ok(self.resources.entry(id).or_insert(record))
    }

    /// 既存リソースのハンドルを置き換える（種別は変えられない）
    pub fn update_resource(&mut self, id: &str, handle: &ProviderHandle) -> Result<&ResourceRecord> {
        handle.validate()?;
        let record = self
            .resources
            .get_mut(id)
            .ok_or_else(|| RegistryError::ResourceNotFound(id.to_string()))?;

        if record.name != handle.kind() {
            return Err(CloudError::MalformedHandle(format!(
                "{} は {} リソースです ({} は登録できません)",
                id,
                record.name,
                handle.kind()
            ))
            .into());
        }

        let now = Utc::now();
        record.provider_handle = handle.to_value()?;
        record.updated_at = now;
        self.updated_at = now;
        Ok(&*record)
    }

    /// 永続化済みレコードをそのまま取り込む（ハンドルは検証済みであること）
    pub(crate) fn insert_record(&mut self, record: ResourceRecord) -> Result<()> {
        if self.resources.contains_key(&record.id) {
            return Err(RegistryError::DuplicateResource(record.id));
        }
        self.resources.insert(record.id.clone(), record);
        Ok(())
    }

    /// destroy を呼ばずにレジストリから外す
    pub fn remove_resource(&mut self, id: &str) -> Result<ResourceRecord> {
        let record = self
            .resources
            .remove(id)
            .ok_or_else(|| RegistryError::ResourceNotFound(id.to_string()))?;
        self.updated_at = Utc::now();
        Ok(record)
    }

    /// 破棄対象を順序付きで返す
    pub fn select(&self, selection: &Selection, order: DestroyOrder) -> Vec<&ResourceRecord> {
        let mut selected: Vec<&ResourceRecord> = self
            .resources_in_order()
            .into_iter()
            .filter(|r| selection.selects(r))
            .collect();
        if order == DestroyOrder::ReverseCreation {
            selected.reverse();
        }
        selected
    }

    /// 選択したリソースを破棄する（ベストエフォート）
    ///
    /// 1件失敗しても残りを続行する。破棄済み・既に存在しないものはレジストリから外し、
    /// 失敗したものは残す。
    pub async fn destroy(
        &mut self,
        selection: &Selection,
        provider: &dyn CloudProvider,
        order: DestroyOrder,
    ) -> Result<DestroyReport> {
        let targets: Vec<(String, ResourceKind, Result<ProviderHandle>)> = self
            .select(selection, order)
            .into_iter()
            .map(|r| (r.id.clone(), r.kind(), r.handle()))
            .collect();

        let mut report = DestroyReport::new();
        for selector in &selection.includes {
            if !self.resources.values().any(|r| r.matches(selector)) {
                tracing::warn!(iteration = %self.id, selector = %selector, "No registered resource matches");
                report.add_unmatched(selector.clone());
            }
        }

        if targets.is_empty() {
            tracing::info!(iteration = %self.id, "Nothing to destroy");
            return Ok(report);
        }

        let auth = provider.check_auth().await?;
        if !auth.authenticated {
            return Err(CloudError::AuthenticationFailed(
                auth.error.unwrap_or_else(|| provider.name().to_string()),
            )
            .into());
        }

        for (id, kind, handle) in targets {
            let handle = match handle {
                Ok(handle) => handle,
                Err(e) => {
                    tracing::error!(resource = %id, "Cannot rebuild handle: {}", e);
                    report.add_failure(id, kind, e.to_string());
                    continue;
                }
            };

            match Capability::bind(handle, provider).destroy().await {
                Ok(DestroyOutcome::Destroyed) => {
                    tracing::info!(resource = %id, kind = %kind, "Destroyed");
                    report.add_destroyed(id);
                }
                Ok(DestroyOutcome::AlreadyGone) => {
                    report.add_not_found(id);
                }
                Err(e) => {
                    tracing::error!(resource = %id, kind = %kind, "Destroy failed: {}", e);
                    report.add_failure(id, kind, e.to_string());
                }
            }
        }

        let removed: Vec<String> = report.removed_ids().cloned().collect();
        for id in &removed {
            self.resources.remove(id);
        }
        if !removed.is_empty() {
            self.updated_at = Utc::now();
        }
        if self.resources.is_empty() {
            self.status = Status::Inactive;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelship_cloud::{FunctionRef, RoleRef, StoreRef};

    fn role() -> ProviderHandle {
        ProviderHandle::Role(RoleRef {
            role_name: "demomodel-role-abcdef".into(),
            role_arn: "arn:aws:iam::123456789012:role/demomodel-role-abcdef".into(),
        })
    }

    fn bucket(name: &str) -> ProviderHandle {
        ProviderHandle::ObjectStore(StoreRef {
            bucket_name: name.into(),
            region: "us-east-1".into(),
        })
    }

    fn function() -> ProviderHandle {
        ProviderHandle::Function(FunctionRef {
            function_name: "demomodel-abcdef".into(),
            function_arn: "arn:aws:lambda:us-east-1:123456789012:function:demomodel-abcdef"
                .into(),
            region: "us-east-1".into(),
        })
    }

    #[test]
    fn test_generate_id() {
        let id = generate_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_add_resource_assigns_id_and_sequence() {
        let mut iteration = Iteration::new("it1", "baseline", "0.1.0");
        let generated = iteration.add_resource(&role(), None).unwrap().id.clone();
        assert_eq!(generated.len(), 8);

        iteration.add_resource(&bucket("b1"), Some("b1")).unwrap();
        iteration.add_resource(&function(), Some("fn")).unwrap();

        let order: Vec<_> = iteration
            .resources_in_order()
            .iter()
            .map(|r| r.kind())
            .collect();
        assert_eq!(
            order,
            vec![
                ResourceKind::Role,
                ResourceKind::ObjectStore,
                ResourceKind::Function
            ]
        );
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut iteration = Iteration::new("it1", "baseline", "0.1.0");
        iteration.add_resource(&bucket("b1"), Some("b1")).unwrap();
        let err = iteration.add_resource(&bucket("b2"), Some("b1")).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateResource(_)));
    }

    #[test]
    fn test_remove_resource() {
        let mut iteration = Iteration::new("it1", "baseline", "0.1.0");
        iteration.add_resource(&bucket("b1"), Some("b1")).unwrap();
        let removed = iteration.remove_resource("b1").unwrap();
        assert_eq!(removed.id, "b1");
        assert!(iteration.is_empty());
        assert!(iteration.remove_resource("b1").unwrap_err().is_not_found());
    }

    #[test]
    fn test_update_resource_keeps_kind() {
        let mut iteration = Iteration::new("it1", "baseline", "0.1.0");
        let created = iteration.add_resource(&bucket("b1"), Some("store")).unwrap().updated_at;

        let updated = iteration.update_resource("store", &bucket("b2")).unwrap();
        assert!(updated.updated_at >= created);
        assert_eq!(updated.handle().unwrap(), bucket("b2"));

        assert!(iteration.update_resource("store", &role()).is_err());
        assert!(iteration.update_resource("missing", &role()).unwrap_err().is_not_found());
    }

    #[test]
    fn test_select_order() {
        let mut iteration = Iteration::new("it1", "baseline", "0.1.0");
        iteration.add_resource(&role(), Some("role")).unwrap();
        iteration.add_resource(&bucket("b1"), Some("store")).unwrap();
        iteration.add_resource(&function(), Some("fn")).unwrap();

        let reverse: Vec<_> = iteration
            .select(&Selection::all(), DestroyOrder::ReverseCreation)
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(reverse, vec!["fn", "store", "role"]);

        let forward: Vec<_> = iteration
            .select(&Selection::excluding(["IAM"]), DestroyOrder::Creation)
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(forward, vec!["store", "fn"]);

        let included: Vec<_> = iteration
            .select(&Selection::including(["store", "AWSLambda"]), DestroyOrder::Creation)
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(included, vec!["store", "fn"]);
    }

    #[test]
    fn test_latest_handle() {
        let mut iteration = Iteration::new("it1", "baseline", "0.1.0");
        iteration.add_resource(&bucket("old"), Some("a")).unwrap();
        iteration.add_resource(&bucket("new"), Some("b")).unwrap();
        assert_eq!(
            iteration.latest_handle(ResourceKind::ObjectStore).unwrap(),
            bucket("new")
        );
        assert!(iteration.latest_handle(ResourceKind::Function).is_err());
    }

    #[test]
    fn test_destroy_order_parse() {
        assert_eq!(
            "reverse-creation".parse::<DestroyOrder>().unwrap(),
            DestroyOrder::ReverseCreation
        );
        assert_eq!("creation".parse::<DestroyOrder>().unwrap(), DestroyOrder::Creation);
        assert!("random".parse::<DestroyOrder>().is_err());
    }
}

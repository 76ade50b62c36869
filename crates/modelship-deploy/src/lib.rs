//! modelship Deploy — デプロイパイプラインと運用操作
//!
//! モデルファイルから推論 API を立ち上げるまでの手順を状態機械として実行し、
//! 作成したリソースを iteration に登録する。update / destroy / status は
//! 登録済みのリソースに対して同じ `CloudProvider` 経由で行う。
//!
//! ```text
//! START → ROLE_READY → REGISTRY_READY → BUCKET_READY → ARTIFACT_UPLOADED
//!       → SERVICE_CODE_GENERATED → IMAGE_BUILT → FUNCTION_READY → API_CREATED
//!       → PERMISSIONS_GRANTED → API_DEPLOYED → SCHEDULED → DONE
//!                          (どこからでも) → FAILED
//! ```

pub mod error;
pub mod logs;
pub mod naming;
pub mod pipeline;
pub mod session;
pub mod state;
pub mod status;
pub mod target;
pub mod update;

pub use error::{DeployError, ErrorKind, Result, StepError};
pub use logs::{LogData, LogEntry, LogValue, Table};
pub use naming::{NamePlan, ObjectKeys, base_name, slug};
pub use pipeline::{
    Mode, Pipeline, PipelineOptions, PipelineReport, PlannedResource, SERVICE_DIR, StepObserver,
};
pub use session::{Outcome, Session, SyncStatus};
pub use state::PipelineState;
pub use status::{LiveResource, LiveState, live_status};
pub use target::{Target, validate_target};
pub use update::{UpdateActions, UpdateReport};

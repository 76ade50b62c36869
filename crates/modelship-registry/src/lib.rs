//! modelship Registry — プロジェクト設定とリソースレジストリ
//!
//! デプロイで作成したクラウドリソースを記録し、後の update / destroy が
//! クラウド側の状態を探し直さずに正しいリソース集合を扱えるようにする。
//!
//! # 概要
//!
//! - **Project**: プロジェクト識別情報、iteration のマップ、現在の iteration、公開URL
//! - **Iteration**: 1回のデプロイで作成したリソースの順序付きレジストリ
//! - **ResourceRecord**: 1リソースの最小限の識別情報
//! - **ProjectStore**: `.modelship/project.json` への保存とプロジェクトロック
//! - **RemoteClient**: リモート設定サービスとの同期

pub mod error;
pub mod iteration;
pub mod project;
pub mod remote;
pub mod resource;
pub mod store;

pub use error::*;
pub use iteration::*;
pub use project::*;
pub use remote::*;
pub use resource::*;
pub use store::*;

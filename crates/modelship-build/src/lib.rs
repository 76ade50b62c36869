//! modelship Build — 推論サービスのソース生成
//!
//! モデル成果物のフレームワークを判別し、Lambda コンテナとして動く
//! FastAPI サービスとそのビルド定義を生成する。

pub mod error;
pub mod framework;
pub mod generator;

pub use error::*;
pub use framework::*;
pub use generator::*;

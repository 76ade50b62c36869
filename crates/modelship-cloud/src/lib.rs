//! modelship cloud capability layer
//!
//! Provider-neutral pieces the deployment pipeline is written against.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 modelship-deploy                 │
//! │           (pipeline / update / destroy)          │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                 modelship-cloud                  │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  trait CloudProvider / CloudResource      │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │ ProviderHandle│ │  poll_until   │            │
//! │  └──────────────┘  └──────────────┘            │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//!           ┌───────▼───────┐
//!           │ modelship-    │
//!           │ cloud-aws     │
//!           └───────────────┘
//! ```

pub mod error;
pub mod handle;
pub mod poll;
pub mod provider;
pub mod report;

// Re-exports
pub use error::{CloudError, Result};
pub use handle::{
    ApiRef, BuildProjectRef, Capability, DestroyOutcome, FunctionRef, ProviderHandle, RegistryRef,
    ResourceKind, RoleRef, ScheduleRef, StoreRef,
};
pub use poll::{CancelHandle, CancelToken, PollConfig, Progress, cancel_pair, poll_until};
pub use provider::{
    AuthStatus, BuildStatus, CloudProvider, CloudResource, FunctionState, ResourceStatus,
};
pub use report::{DestroyFailure, DestroyReport};

//! Stage and production promotion of packaged model images.
//!
//! A promotion assumes the environment's deployment role, publishes the
//! function from the image `<repo>:<model version>` as a new immutable
//! version, and repoints the live alias at that version.

pub mod aws;
pub mod config;
pub mod environment;
pub mod error;
pub mod memory;
pub mod platform;
pub mod promoter;

pub use config::DeployConfig;
pub use environment::Environment;
pub use error::{DeployError, DeployResult};
pub use memory::{FailurePoint, InMemoryPlatform, PlatformCall};
pub use platform::{
    AliasState, CredentialBroker, FunctionControl, FunctionControlFactory, PublishedVersion,
    TemporaryCredentials,
};
pub use promoter::{PromotionReport, PromotionStage, Promoter};

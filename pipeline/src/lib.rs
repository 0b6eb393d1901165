//! Entry points that connect the release workflow to the `approval` and
//! `deploy` crates.

pub mod handlers;
pub mod logging;

pub use handlers::{
    handle_approval, handle_deploy, ApprovalEvent, DeployEvent, HandlerError, HandlerResponse,
    HandlerResult,
};
pub use logging::{init_tracing, LogFormat};

pub mod config;
pub mod error;
pub mod message;
pub mod notifier;
pub mod types;

pub use config::ApprovalConfig;
pub use error::{ApprovalError, ApprovalResult};
pub use message::{callback_url, encode_token, task_token_from_url, ApprovalMessage, CallbackAction};
pub use notifier::{DeliveryReport, SlackNotifier};
pub use types::{Block, ButtonElement, ButtonStyle, SlackMessage, TextObject};

pub mod prelude {
    pub use crate::config::*;
    pub use crate::error::*;
    pub use crate::message::*;
    pub use crate::notifier::*;
    pub use crate::types::*;
}

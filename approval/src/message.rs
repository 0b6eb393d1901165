use crate::error::{ApprovalError, ApprovalResult};
use crate::types::{Block, ButtonElement, ButtonStyle, SlackMessage, TextObject};
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

pub const TASK_TOKEN_PARAM: &str = "taskToken";

/// Decision a reviewer can make from the notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CallbackAction {
    Approve,
    Reject,
}

impl CallbackAction {
    /// Path appended to the API base URL. Approval always targets production.
    pub fn path(&self) -> &'static str {
        match self {
            CallbackAction::Approve => "prod/approve",
            CallbackAction::Reject => "prod/reject",
        }
    }
}

/// Form-encodes a task token: spaces become `+`, everything outside
/// `[A-Za-z0-9*._-]` is percent-escaped.
pub fn encode_token(token: &str) -> String {
    form_urlencoded::byte_serialize(token.as_bytes()).collect()
}

/// `base_url` must already end with `/`.
pub fn callback_url(base_url: &str, action: CallbackAction, token: &str) -> String {
    format!(
        "{}{}?{}={}",
        base_url,
        action.path(),
        TASK_TOKEN_PARAM,
        encode_token(token)
    )
}

/// Recovers the task token from a callback URL produced by [`callback_url`].
pub fn task_token_from_url(callback: &str) -> ApprovalResult<Option<String>> {
    let parsed = url::Url::parse(callback)?;
    Ok(parsed
        .query_pairs()
        .find(|(key, _)| key == TASK_TOKEN_PARAM)
        .map(|(_, value)| value.into_owned()))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApprovalMessage {
    pub feature_name: String,
    pub approve_url: String,
    pub reject_url: String,
}

impl ApprovalMessage {
    pub fn new(feature_name: impl Into<String>, base_url: &str, token: &str) -> ApprovalResult<Self> {
        if token.is_empty() {
            return Err(ApprovalError::EmptyToken);
        }

        Ok(Self {
            feature_name: feature_name.into(),
            approve_url: callback_url(base_url, CallbackAction::Approve, token),
            reject_url: callback_url(base_url, CallbackAction::Reject, token),
        })
    }

    pub fn headline(&self) -> String {
        format!(
            "🚀 New model for {} feature was deployed to stage environment. \
             Please approve or reject deployment to production environment.",
            self.feature_name
        )
    }

    pub fn to_slack(&self) -> SlackMessage {
        SlackMessage {
            blocks: vec![
                Block::Section {
                    text: TextObject::plain(self.headline()).with_emoji(),
                },
                Block::Actions {
                    elements: vec![
                        ButtonElement::link("Approve", ButtonStyle::Primary, &self.approve_url),
                        ButtonElement::link("Reject", ButtonStyle::Danger, &self.reject_url),
                    ],
                },
            ],
        }
    }
}

//! Webhook payload structures and event classification

use serde::Deserialize;
use std::fmt;

pub const BRANCH_REF_PREFIX: &str = "refs/heads/";
pub const TAG_REF_PREFIX: &str = "refs/tags/";

/// The subset of a push notification the hooks care about.
#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    pub repository: Repository,
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub after: String,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub full_name: String,
}

impl PushEvent {
    pub fn from_slice(body: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(body)
    }

    pub fn is_tag(&self) -> bool {
        self.reference.starts_with(TAG_REF_PREFIX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    BranchPush,
    TagPush,
    Unhandled,
}

impl EventKind {
    /// Value passed to hook scripts as their fourth argument.
    pub fn as_arg(&self) -> &'static str {
        match self {
            EventKind::BranchPush => "push",
            EventKind::TagPush => "tag",
            EventKind::Unhandled => "unhandled",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arg())
    }
}

/// An event reduced to what the script needs: the commit for branch pushes,
/// the tag name for tag pushes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedEvent {
    pub kind: EventKind,
    pub value: String,
}

impl ClassifiedEvent {
    fn unhandled() -> Self {
        Self {
            kind: EventKind::Unhandled,
            value: String::new(),
        }
    }
}

/// Classify a push against the branch of the hook it matched.
///
/// Deletions are never actioned, and neither are refs for other branches.
pub fn classify_event(event: &PushEvent, hook_branch: &str) -> ClassifiedEvent {
    if event.deleted {
        return ClassifiedEvent::unhandled();
    }

    if let Some(tag) = event.reference.strip_prefix(TAG_REF_PREFIX) {
        return ClassifiedEvent {
            kind: EventKind::TagPush,
            value: tag.to_string(),
        };
    }

    match event.reference.strip_prefix(BRANCH_REF_PREFIX) {
        Some(branch) if branch == hook_branch => ClassifiedEvent {
            kind: EventKind::BranchPush,
            value: event.after.clone(),
        },
        _ => ClassifiedEvent::unhandled(),
    }
}

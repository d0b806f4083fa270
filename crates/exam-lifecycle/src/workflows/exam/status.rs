use serde::{Deserialize, Serialize};
use std::fmt;

/// Entities whose lifecycle is governed by a transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Exam,
    Datesheet,
    Entry,
    Paper,
    Question,
    Mark,
    Result,
    Job,
}

impl EntityKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Exam => "exam",
            Self::Datesheet => "datesheet",
            Self::Entry => "datesheet entry",
            Self::Paper => "paper",
            Self::Question => "question",
            Self::Mark => "mark",
            Self::Result => "result",
            Self::Job => "job",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Explains a refused transition in terms a UI can render directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionRejected {
    pub entity: EntityKind,
    pub current: &'static str,
    pub action: &'static str,
    pub target: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TransitionRejected {
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl fmt::Display for TransitionRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot {} {} while it is '{}' (would become '{}')",
            self.action, self.entity, self.current, self.target
        )?;
        if let Some(reason) = &self.reason {
            write!(f, ": {reason}")?;
        }
        Ok(())
    }
}

impl std::error::Error for TransitionRejected {}

/// Closed status enum with an explicit `(state, action) -> state` table.
pub trait StatusPolicy: Copy + Eq + fmt::Debug {
    type Action: Copy + fmt::Debug;

    const ENTITY: EntityKind;

    /// The state reached by `action`, or `None` when the guard refuses it.
    fn next(self, action: Self::Action) -> Option<Self>;

    /// The state an action produces on its happy path.
    fn target(action: Self::Action) -> Self;

    fn label(self) -> &'static str;

    fn action_label(action: Self::Action) -> &'static str;

    fn transition(self, action: Self::Action) -> Result<Self, TransitionRejected> {
        self.next(action).ok_or_else(|| self.refuse(action))
    }

    /// Build the rejection for `action`, for guards that live outside the table.
    fn refuse(self, action: Self::Action) -> TransitionRejected {
        TransitionRejected {
            entity: Self::ENTITY,
            current: self.label(),
            action: Self::action_label(action),
            target: Self::target(action).label(),
            reason: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamStatus {
    Open,
    Locked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExamAction {
    Lock,
}

impl StatusPolicy for ExamStatus {
    type Action = ExamAction;

    const ENTITY: EntityKind = EntityKind::Exam;

    fn next(self, action: ExamAction) -> Option<Self> {
        match (self, action) {
            (Self::Open, ExamAction::Lock) => Some(Self::Locked),
            (Self::Locked, ExamAction::Lock) => None,
        }
    }

    fn target(action: ExamAction) -> Self {
        match action {
            ExamAction::Lock => Self::Locked,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Locked => "locked",
        }
    }

    fn action_label(action: ExamAction) -> &'static str {
        match action {
            ExamAction::Lock => "lock",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatesheetStatus {
    Draft,
    Published,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatesheetAction {
    Publish,
    Archive,
    /// Entry add/update/delete.
    Edit,
}

impl DatesheetStatus {
    pub const fn is_editable(self) -> bool {
        matches!(self, Self::Draft)
    }
}

impl StatusPolicy for DatesheetStatus {
    type Action = DatesheetAction;

    const ENTITY: EntityKind = EntityKind::Datesheet;

    fn next(self, action: DatesheetAction) -> Option<Self> {
        use DatesheetAction::*;
        match (self, action) {
            (Self::Draft, Publish) => Some(Self::Published),
            (Self::Draft, Archive) | (Self::Published, Archive) => Some(Self::Archived),
            (Self::Draft, Edit) => Some(Self::Draft),
            _ => None,
        }
    }

    fn target(action: DatesheetAction) -> Self {
        match action {
            DatesheetAction::Publish => Self::Published,
            DatesheetAction::Archive => Self::Archived,
            DatesheetAction::Edit => Self::Draft,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }

    fn action_label(action: DatesheetAction) -> &'static str {
        match action {
            DatesheetAction::Publish => "publish",
            DatesheetAction::Archive => "archive",
            DatesheetAction::Edit => "edit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
    Locked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperAction {
    /// Question add/update/delete. A rejected paper drops back to draft.
    Edit,
    Submit,
    Approve,
    Reject,
    Lock,
}

impl PaperStatus {
    pub const fn ordered() -> [Self; 5] {
        [
            Self::Draft,
            Self::Submitted,
            Self::Approved,
            Self::Rejected,
            Self::Locked,
        ]
    }

    pub const fn is_editable(self) -> bool {
        matches!(self, Self::Draft | Self::Rejected)
    }

    pub const fn is_approved(self) -> bool {
        matches!(self, Self::Approved | Self::Locked)
    }
}

impl StatusPolicy for PaperStatus {
    type Action = PaperAction;

    const ENTITY: EntityKind = EntityKind::Paper;

    fn next(self, action: PaperAction) -> Option<Self> {
        use PaperAction::*;
        match (self, action) {
            (Self::Draft, Edit) | (Self::Rejected, Edit) => Some(Self::Draft),
            (Self::Draft, Submit) | (Self::Rejected, Submit) => Some(Self::Submitted),
            (Self::Submitted, Approve) => Some(Self::Approved),
            (Self::Submitted, Reject) => Some(Self::Rejected),
            (Self::Approved, Lock) => Some(Self::Locked),
            _ => None,
        }
    }

    fn target(action: PaperAction) -> Self {
        match action {
            PaperAction::Edit => Self::Draft,
            PaperAction::Submit => Self::Submitted,
            PaperAction::Approve => Self::Approved,
            PaperAction::Reject => Self::Rejected,
            PaperAction::Lock => Self::Locked,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Locked => "locked",
        }
    }

    fn action_label(action: PaperAction) -> &'static str {
        match action {
            PaperAction::Edit => "edit",
            PaperAction::Submit => "submit",
            PaperAction::Approve => "approve",
            PaperAction::Reject => "reject",
            PaperAction::Lock => "lock",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkStatus {
    Draft,
    Submitted,
    Verified,
    Locked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkAction {
    /// Rewrite `marks_obtained` / `is_absent`.
    Edit,
    Submit,
    Verify,
    Lock,
}

impl MarkStatus {
    pub const fn ordered() -> [Self; 4] {
        [Self::Draft, Self::Submitted, Self::Verified, Self::Locked]
    }

    pub const fn is_verified(self) -> bool {
        matches!(self, Self::Verified | Self::Locked)
    }
}

impl StatusPolicy for MarkStatus {
    type Action = MarkAction;

    const ENTITY: EntityKind = EntityKind::Mark;

    fn next(self, action: MarkAction) -> Option<Self> {
        use MarkAction::*;
        match (self, action) {
            (Self::Draft, Edit) => Some(Self::Draft),
            (Self::Draft, Submit) => Some(Self::Submitted),
            (Self::Submitted, Verify) => Some(Self::Verified),
            (Self::Verified, Lock) => Some(Self::Locked),
            _ => None,
        }
    }

    fn target(action: MarkAction) -> Self {
        match action {
            MarkAction::Edit => Self::Draft,
            MarkAction::Submit => Self::Submitted,
            MarkAction::Verify => Self::Verified,
            MarkAction::Lock => Self::Locked,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Verified => "verified",
            Self::Locked => "locked",
        }
    }

    fn action_label(action: MarkAction) -> &'static str {
        match action {
            MarkAction::Edit => "edit",
            MarkAction::Submit => "submit",
            MarkAction::Verify => "verify",
            MarkAction::Lock => "lock",
        }
    }
}

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for admission applications.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Coarse lifecycle phase. Serialized as its stage number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Stage {
    Intake = 1,
    UniversitySubmission = 2,
    Offer = 3,
    Visa = 4,
    Enrollment = 5,
}

impl Stage {
    pub const fn ordered() -> [Self; 5] {
        [
            Self::Intake,
            Self::UniversitySubmission,
            Self::Offer,
            Self::Visa,
            Self::Enrollment,
        ]
    }

    pub const fn number(self) -> u8 {
        self as u8
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Intake => "Application & Documents",
            Self::UniversitySubmission => "University Submission",
            Self::Offer => "Offer",
            Self::Visa => "Visa",
            Self::Enrollment => "Enrollment & Commission",
        }
    }
}

impl From<Stage> for u8 {
    fn from(stage: Stage) -> Self {
        stage.number()
    }
}

impl TryFrom<u8> for Stage {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ordered()
            .into_iter()
            .find(|stage| stage.number() == value)
            .ok_or_else(|| format!("stage must be between 1 and 5, found {value}"))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Status literal. Only meaningful together with a [`Stage`]; see [`StageStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Draft,
    NewApplication,
    UnderReviewAdmin,
    CorrectionRequestedAdmin,
    DocumentsPartiallySubmitted,
    DocumentsSubmitted,
    DocumentsUnderReview,
    DocumentsResubmissionRequired,
    DocumentsRejected,
    DocumentsApproved,
    #[serde(rename = "approved_stage1")]
    ApprovedStage1,
    #[serde(rename = "rejected_stage1")]
    RejectedStage1,
    SubmittedToUniversity,
    UnderUniversityReview,
    UniversityInfoRequested,
    RejectedUniversity,
    ConditionalOffer,
    ConditionsSubmitted,
    UnconditionalOffer,
    OfferAccepted,
    OfferDeclined,
    VisaLodged,
    VisaInfoRequested,
    VisaGranted,
    VisaRefused,
    EnrollmentPending,
    Enrolled,
    CommissionInvoiced,
    CommissionPaid,
    /// Hold marker; the real status lives in `previous_status`.
    OnHold,
    Cancelled,
}

impl ApplicationStatus {
    pub const ALL: [Self; 31] = [
        Self::Draft,
        Self::NewApplication,
        Self::UnderReviewAdmin,
        Self::CorrectionRequestedAdmin,
        Self::DocumentsPartiallySubmitted,
        Self::DocumentsSubmitted,
        Self::DocumentsUnderReview,
        Self::DocumentsResubmissionRequired,
        Self::DocumentsRejected,
        Self::DocumentsApproved,
        Self::ApprovedStage1,
        Self::RejectedStage1,
        Self::SubmittedToUniversity,
        Self::UnderUniversityReview,
        Self::UniversityInfoRequested,
        Self::RejectedUniversity,
        Self::ConditionalOffer,
        Self::ConditionsSubmitted,
        Self::UnconditionalOffer,
        Self::OfferAccepted,
        Self::OfferDeclined,
        Self::VisaLodged,
        Self::VisaInfoRequested,
        Self::VisaGranted,
        Self::VisaRefused,
        Self::EnrollmentPending,
        Self::Enrolled,
        Self::CommissionInvoiced,
        Self::CommissionPaid,
        Self::OnHold,
        Self::Cancelled,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::NewApplication => "new_application",
            Self::UnderReviewAdmin => "under_review_admin",
            Self::CorrectionRequestedAdmin => "correction_requested_admin",
            Self::DocumentsPartiallySubmitted => "documents_partially_submitted",
            Self::DocumentsSubmitted => "documents_submitted",
            Self::DocumentsUnderReview => "documents_under_review",
            Self::DocumentsResubmissionRequired => "documents_resubmission_required",
            Self::DocumentsRejected => "documents_rejected",
            Self::DocumentsApproved => "documents_approved",
            Self::ApprovedStage1 => "approved_stage1",
            Self::RejectedStage1 => "rejected_stage1",
            Self::SubmittedToUniversity => "submitted_to_university",
            Self::UnderUniversityReview => "under_university_review",
            Self::UniversityInfoRequested => "university_info_requested",
            Self::RejectedUniversity => "rejected_university",
            Self::ConditionalOffer => "conditional_offer",
            Self::ConditionsSubmitted => "conditions_submitted",
            Self::UnconditionalOffer => "unconditional_offer",
            Self::OfferAccepted => "offer_accepted",
            Self::OfferDeclined => "offer_declined",
            Self::VisaLodged => "visa_lodged",
            Self::VisaInfoRequested => "visa_info_requested",
            Self::VisaGranted => "visa_granted",
            Self::VisaRefused => "visa_refused",
            Self::EnrollmentPending => "enrollment_pending",
            Self::Enrolled => "enrolled",
            Self::CommissionInvoiced => "commission_invoiced",
            Self::CommissionPaid => "commission_paid",
            Self::OnHold => "on_hold",
            Self::Cancelled => "cancelled",
        }
    }

    /// Markers never appear as authority matrix keys or targets.
    pub const fn is_marker(self) -> bool {
        matches!(self, Self::OnHold | Self::Cancelled)
    }

    /// Statuses whose entering transition populates `rejection_reason`.
    pub const fn is_rejection(self) -> bool {
        matches!(
            self,
            Self::RejectedStage1
                | Self::DocumentsRejected
                | Self::RejectedUniversity
                | Self::OfferDeclined
                | Self::VisaRefused
        )
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown application status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for ApplicationStatus {
    type Err = UnknownStatus;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::Draft);
        }
        Self::ALL
            .into_iter()
            .find(|status| status.label().eq_ignore_ascii_case(raw))
            .ok_or_else(|| UnknownStatus(raw.to_string()))
    }
}

/// Composite `(stage, status)` key; the only valid lookup unit into the authority matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StageStatus {
    pub stage: Stage,
    pub status: ApplicationStatus,
}

impl StageStatus {
    pub const fn new(stage: Stage, status: ApplicationStatus) -> Self {
        Self { stage, status }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.stage, self.status)
    }
}

/// Parties that may act on an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Admin,
    Partner,
    University,
    Immigration,
    System,
}

impl ActorRole {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Partner => "Partner",
            Self::University => "University",
            Self::Immigration => "Immigration",
            Self::System => "System",
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ActorRole {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "partner" => Ok(Self::Partner),
            "university" => Ok(Self::University),
            "immigration" => Ok(Self::Immigration),
            "system" => Ok(Self::System),
            other => Err(format!("unknown actor role '{other}'")),
        }
    }
}

/// Verified caller capability.
///
/// Built by the caller after authentication; the engine trusts the role claims it carries and
/// never re-derives them. The override claim lets a caller act on states owned by another role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    role: ActorRole,
    id: String,
    can_override: bool,
}

impl Actor {
    pub fn verified(role: ActorRole, id: impl Into<String>) -> Self {
        Self {
            role,
            id: id.into(),
            can_override: role == ActorRole::System,
        }
    }

    pub fn system() -> Self {
        Self::verified(ActorRole::System, "system")
    }

    pub fn with_override(mut self) -> Self {
        self.can_override = true;
        self
    }

    pub fn role(&self) -> ActorRole {
        self.role
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn can_override(&self) -> bool {
        self.can_override
    }
}

/// Document type tag such as `passport`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentTag(String);

impl DocumentTag {
    pub fn new(tag: impl AsRef<str>) -> Self {
        Self(tag.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable audit record of one transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageHistoryEntry {
    pub stage: Stage,
    pub status: ApplicationStatus,
    pub timestamp: DateTime<Utc>,
    pub actor: ActorRole,
    pub actor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Aggregate root driven by the workflow engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub stage: Stage,
    pub status: ApplicationStatus,
    pub next_actor: ActorRole,
    pub next_action: String,
    pub stage_history: Vec<StageHistoryEntry>,
    pub rejection_reason: Option<String>,
    pub hold_reason: Option<String>,
    pub cancel_reason: Option<String>,
    pub resume_reason: Option<String>,
    pub previous_status: Option<ApplicationStatus>,
    pub held_by: Option<String>,
    pub held_at: Option<DateTime<Utc>>,
    pub resumed_by: Option<String>,
    pub resumed_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub released_by: Option<String>,
    pub documents_required: BTreeSet<DocumentTag>,
    pub active_document_request: Option<String>,
    /// Optimistic concurrency counter; bumped on every committed write.
    pub version: u64,
}

impl Application {
    /// Fresh pre-submission record. Nothing has been persisted yet, so `version` is zero.
    pub fn draft(id: ApplicationId, documents_required: BTreeSet<DocumentTag>) -> Self {
        Self {
            id,
            stage: Stage::Intake,
            status: ApplicationStatus::Draft,
            next_actor: ActorRole::Partner,
            next_action: "Complete and submit the application".to_string(),
            stage_history: Vec::new(),
            rejection_reason: None,
            hold_reason: None,
            cancel_reason: None,
            resume_reason: None,
            previous_status: None,
            held_by: None,
            held_at: None,
            resumed_by: None,
            resumed_at: None,
            cancelled_by: None,
            cancelled_at: None,
            approved_by: None,
            released_by: None,
            documents_required,
            active_document_request: None,
            version: 0,
        }
    }

    pub fn key(&self) -> StageStatus {
        StageStatus::new(self.stage, self.status)
    }

    pub fn is_held(&self) -> bool {
        self.status == ApplicationStatus::OnHold
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == ApplicationStatus::Cancelled
    }

    pub fn last_recorded_at(&self) -> Option<DateTime<Utc>> {
        self.stage_history.last().map(|entry| entry.timestamp)
    }
}

/// Payload used by the intake flow to open a new application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApplication {
    pub id: ApplicationId,
    /// `None` falls back to the engine's configured defaults; an empty set requires nothing.
    #[serde(default)]
    pub documents_required: Option<BTreeSet<DocumentTag>>,
}

use super::{DocumentRequirement, MatrixEntry, ProvenanceStamp, TransitionRule};
use crate::workflows::admission::domain::{ActorRole, ApplicationStatus as S, DocumentTag, Stage};
use crate::workflows::admission::triggers::TriggerKind;

use ActorRole::{Admin, Immigration, Partner, System, University};

fn intake(status: S) -> TransitionRule {
    TransitionRule::new(Stage::Intake, status)
}

fn university(status: S) -> TransitionRule {
    TransitionRule::new(Stage::UniversitySubmission, status)
}

fn offer(status: S) -> TransitionRule {
    TransitionRule::new(Stage::Offer, status)
}

fn visa(status: S) -> TransitionRule {
    TransitionRule::new(Stage::Visa, status)
}

fn enrollment(status: S) -> TransitionRule {
    TransitionRule::new(Stage::Enrollment, status)
}

fn visa_documents() -> DocumentRequirement {
    DocumentRequirement::Tags(
        ["offer_letter", "financial_evidence"]
            .into_iter()
            .map(DocumentTag::new)
            .collect(),
    )
}

pub(super) fn standard_entries() -> Vec<MatrixEntry> {
    let mut entries = intake_entries();
    entries.extend(university_entries());
    entries.extend(offer_entries());
    entries.extend(visa_entries());
    entries.extend(enrollment_entries());
    entries
}

fn intake_entries() -> Vec<MatrixEntry> {
    let stage = Stage::Intake;
    vec![
        MatrixEntry::new(stage, S::Draft, Partner, "Complete and submit the application")
            .to(intake(S::NewApplication).by(System)),
        MatrixEntry::new(stage, S::NewApplication, Admin, "Review the new application")
            .to(intake(S::UnderReviewAdmin))
            .to(intake(S::CorrectionRequestedAdmin).with_reason())
            .to(intake(S::DocumentsSubmitted).by(System))
            .to(intake(S::RejectedStage1).with_reason()),
        MatrixEntry::new(stage, S::UnderReviewAdmin, Admin, "Complete the admin review")
            .to(intake(S::CorrectionRequestedAdmin).with_reason())
            .to(intake(S::DocumentsUnderReview))
            .to(intake(S::RejectedStage1).with_reason()),
        MatrixEntry::new(
            stage,
            S::CorrectionRequestedAdmin,
            Partner,
            "Upload the requested corrections and documents",
        )
        .to(intake(S::DocumentsSubmitted).by(System))
        .to(intake(S::DocumentsPartiallySubmitted).by(System)),
        MatrixEntry::new(
            stage,
            S::DocumentsPartiallySubmitted,
            Partner,
            "Upload the remaining required documents",
        )
        .to(intake(S::DocumentsSubmitted).by(System)),
        MatrixEntry::new(stage, S::DocumentsSubmitted, Admin, "Review the submitted documents")
            .to(intake(S::DocumentsUnderReview))
            .to(intake(S::DocumentsApproved).with_documents(DocumentRequirement::Application))
            .to(intake(S::DocumentsResubmissionRequired).with_reason())
            .to(intake(S::DocumentsRejected).with_reason()),
        MatrixEntry::new(stage, S::DocumentsUnderReview, Admin, "Complete the document review")
            .to(intake(S::DocumentsApproved).with_documents(DocumentRequirement::Application))
            .to(intake(S::DocumentsResubmissionRequired).with_reason())
            .to(intake(S::DocumentsRejected).with_reason())
            .to(intake(S::RejectedStage1).with_reason()),
        MatrixEntry::new(
            stage,
            S::DocumentsResubmissionRequired,
            Partner,
            "Resubmit the rejected documents",
        )
        .to(intake(S::DocumentsSubmitted).by(System))
        .to(intake(S::DocumentsPartiallySubmitted).by(System)),
        MatrixEntry::new(
            stage,
            S::DocumentsRejected,
            Admin,
            "Request resubmission or reject the application",
        )
        .notify(&[Partner])
        .to(intake(S::DocumentsResubmissionRequired).with_reason())
        .to(intake(S::RejectedStage1).with_reason()),
        MatrixEntry::new(stage, S::DocumentsApproved, Admin, "Finalise stage 1 approval")
            .auto_trigger(TriggerKind::Stage1FinalApproval)
            .to(intake(S::ApprovedStage1).by(System)),
        MatrixEntry::new(stage, S::ApprovedStage1, Admin, "Prepare the university submission")
            .notify(&[Partner])
            .stamps(ProvenanceStamp::Approved)
            .to(university(S::SubmittedToUniversity)),
        MatrixEntry::new(stage, S::RejectedStage1, Partner, "Acknowledge the rejection")
            .notify(&[Admin])
            .terminal(),
    ]
}

fn university_entries() -> Vec<MatrixEntry> {
    let stage = Stage::UniversitySubmission;
    vec![
        MatrixEntry::new(
            stage,
            S::SubmittedToUniversity,
            University,
            "Acknowledge and review the application",
        )
        .notify(&[Partner])
        .to(university(S::UnderUniversityReview))
        .to(university(S::UniversityInfoRequested).with_reason())
        .to(university(S::RejectedUniversity).with_reason()),
        MatrixEntry::new(
            stage,
            S::UnderUniversityReview,
            University,
            "Render an admission decision",
        )
        .to(university(S::UniversityInfoRequested).with_reason())
        .to(offer(S::ConditionalOffer))
        .to(offer(S::UnconditionalOffer))
        .to(university(S::RejectedUniversity).with_reason()),
        MatrixEntry::new(
            stage,
            S::UniversityInfoRequested,
            Partner,
            "Provide the information requested by the university",
        )
        .to(university(S::UnderUniversityReview)),
        MatrixEntry::new(
            stage,
            S::RejectedUniversity,
            Admin,
            "Choose another university or close the application",
        )
        .notify(&[Partner])
        .to(intake(S::ApprovedStage1).with_reason()),
    ]
}

fn offer_entries() -> Vec<MatrixEntry> {
    let stage = Stage::Offer;
    vec![
        MatrixEntry::new(stage, S::ConditionalOffer, Partner, "Satisfy the offer conditions")
            .notify(&[Admin])
            .to(offer(S::ConditionsSubmitted))
            .to(offer(S::OfferDeclined).with_reason()),
        MatrixEntry::new(
            stage,
            S::ConditionsSubmitted,
            University,
            "Review the submitted offer conditions",
        )
        .to(offer(S::UnconditionalOffer))
        .to(offer(S::ConditionalOffer).with_reason()),
        MatrixEntry::new(
            stage,
            S::UnconditionalOffer,
            Partner,
            "Accept the offer and pay the tuition deposit",
        )
        .notify(&[Admin])
        .to(offer(S::OfferAccepted))
        .to(offer(S::OfferDeclined).with_reason()),
        MatrixEntry::new(stage, S::OfferAccepted, Admin, "Lodge the visa application")
            .to(visa(S::VisaLodged).with_documents(visa_documents())),
        MatrixEntry::new(stage, S::OfferDeclined, Partner, "Offer declined")
            .notify(&[Admin])
            .terminal(),
    ]
}

fn visa_entries() -> Vec<MatrixEntry> {
    let stage = Stage::Visa;
    vec![
        MatrixEntry::new(stage, S::VisaLodged, Immigration, "Assess the visa application")
            .notify(&[Partner])
            .to(visa(S::VisaInfoRequested).with_reason())
            .to(visa(S::VisaGranted))
            .to(visa(S::VisaRefused).with_reason()),
        MatrixEntry::new(
            stage,
            S::VisaInfoRequested,
            Partner,
            "Supply the information requested by immigration",
        )
        .to(visa(S::VisaLodged)),
        MatrixEntry::new(stage, S::VisaGranted, Admin, "Confirm enrolment with the university")
            .notify(&[Partner])
            .to(enrollment(S::EnrollmentPending)),
        MatrixEntry::new(stage, S::VisaRefused, Partner, "Acknowledge the visa refusal")
            .notify(&[Admin])
            .terminal(),
    ]
}

fn enrollment_entries() -> Vec<MatrixEntry> {
    let stage = Stage::Enrollment;
    vec![
        MatrixEntry::new(
            stage,
            S::EnrollmentPending,
            University,
            "Confirm the student's enrolment",
        )
        .to(enrollment(S::Enrolled)),
        MatrixEntry::new(stage, S::Enrolled, Admin, "Invoice the university for commission")
            .not_cancellable()
            .to(enrollment(S::CommissionInvoiced)),
        MatrixEntry::new(
            stage,
            S::CommissionInvoiced,
            University,
            "Pay the commission invoice",
        )
        .not_cancellable()
        .notify(&[Admin])
        .to(enrollment(S::CommissionPaid)),
        MatrixEntry::new(stage, S::CommissionPaid, Admin, "Commission settled")
            .stamps(ProvenanceStamp::Released)
            .not_cancellable()
            .terminal(),
    ]
}

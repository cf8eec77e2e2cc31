//! Appeals against rejected transfers, with federation escalation.
//!
//! ```text
//! PENDING ──uphold──────────────▶ UPHELD ............ transfer APPROVED
//!    │    ──uphold(federation)──▶ ESCALATED ──▶ FEDERATION_APPROVED ... transfer APPROVED
//!    │                                     └──▶ FEDERATION_REJECTED
//!    ├──dismiss──▶ DISMISSED
//!    └──withdraw─▶ WITHDRAWN
//! ```
//!
//! Approval of the transfer runs in the same transaction as the appeal
//! decision, through the transfer manager's approval path.
use crate::config::EscalationPolicy;
use crate::error::WorkflowError;
use crate::events::{EventKind, WorkflowEvent, stage_event};
use crate::policy::{Action, Actor, AuthorizationPolicy, Target};
use crate::store::{Tx, TxResult, abort, appeal_key, guard, read, write};
use crate::transfer::{TransferRequest, TransferRequestManager, TransferStatus};
use crate::types::{TimeStamp, UserId};
use crate::utils::{APPEAL_HRP, new_uuid_to_bech32};
use chrono::Utc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppealStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Upheld,
    #[n(2)]
    Dismissed,
    #[n(3)]
    Withdrawn,
    #[n(4)]
    Escalated,
    #[n(5)]
    FederationApproved,
    #[n(6)]
    FederationRejected,
}

impl AppealStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppealStatus::Pending => "PENDING",
            AppealStatus::Upheld => "UPHELD",
            AppealStatus::Dismissed => "DISMISSED",
            AppealStatus::Withdrawn => "WITHDRAWN",
            AppealStatus::Escalated => "ESCALATED",
            AppealStatus::FederationApproved => "FEDERATION_APPROVED",
            AppealStatus::FederationRejected => "FEDERATION_REJECTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AppealStatus::Pending | AppealStatus::Escalated)
    }
}

/// Reference to a document held by the external document store.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct SupportingDocument {
    #[n(0)]
    pub file_name: String,
    #[n(1)]
    pub sha256: String, // hex digest of the uploaded bytes
}

impl SupportingDocument {
    pub fn from_bytes(file_name: impl Into<String>, contents: &[u8]) -> Self {
        Self {
            file_name: file_name.into(),
            sha256: sha256::digest(contents),
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct AppealCase {
    #[n(0)]
    pub id: String, // bech32, `appeal_` prefix
    #[n(1)]
    pub transfer_id: String,
    #[n(2)]
    pub submitted_by: UserId,
    #[n(3)]
    pub status: AppealStatus,
    #[n(4)]
    pub appeal_reason: String,
    #[n(5)]
    pub supporting_document: Option<SupportingDocument>,
    #[n(6)]
    pub reviewer: Option<UserId>,
    #[n(7)]
    pub review_date: Option<TimeStamp<Utc>>,
    #[n(8)]
    pub review_notes: Option<String>,
    #[n(9)]
    pub requires_federation_approval: bool,
    #[n(10)]
    pub federation_reviewer: Option<UserId>,
    #[n(11)]
    pub federation_review_date: Option<TimeStamp<Utc>>,
    #[n(12)]
    pub federation_review_notes: Option<String>,
    #[n(13)]
    pub submission_date: TimeStamp<Utc>,
}

impl AppealCase {
    fn invalid_transition(&self, action: &'static str) -> WorkflowError {
        WorkflowError::InvalidStateTransition {
            entity: self.id.clone(),
            from: self.status.as_str(),
            action,
        }
    }

    fn stamp_review(&mut self, reviewer: &str, notes: &str) {
        self.reviewer = Some(reviewer.to_string());
        self.review_date = Some(TimeStamp::new());
        self.review_notes = Some(notes.to_string());
    }
}

/// An appeal decision together with the transfer as it stands afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppealDecision {
    pub appeal: AppealCase,
    pub transfer: TransferRequest,
}

#[derive(Clone)]
pub struct AppealCaseManager {
    transfers: TransferRequestManager,
    policy: AuthorizationPolicy,
    escalation: EscalationPolicy,
}

impl AppealCaseManager {
    pub fn new(
        transfers: TransferRequestManager,
        policy: AuthorizationPolicy,
        escalation: EscalationPolicy,
    ) -> Self {
        Self {
            transfers,
            policy,
            escalation,
        }
    }

    pub fn load(&self, tx: &Tx<'_>, appeal_id: &str) -> TxResult<AppealCase> {
        match read(tx.appeals, appeal_id)? {
            Some(appeal) => Ok(appeal),
            None => abort(WorkflowError::AppealNotFound(appeal_id.to_string())),
        }
    }

    fn load_with_transfer(
        &self,
        tx: &Tx<'_>,
        appeal_id: &str,
    ) -> TxResult<(AppealCase, TransferRequest)> {
        let appeal = self.load(tx, appeal_id)?;
        let transfer = self.transfers.load(tx, &appeal.transfer_id)?;
        Ok((appeal, transfer))
    }

    pub fn create_appeal(
        &self,
        tx: &Tx<'_>,
        submitted_by: &Actor,
        transfer_id: &str,
        reason: &str,
        document: Option<SupportingDocument>,
    ) -> TxResult<AppealCase> {
        let transfer = self.transfers.load(tx, transfer_id)?;
        guard(self.policy.check(
            submitted_by,
            Action::CreateAppeal,
            &Target::club(&transfer.from_club),
        ))?;

        if transfer.status != TransferStatus::Rejected {
            return abort(WorkflowError::AppealNotAllowed {
                transfer_id: transfer.id.clone(),
                status: transfer.status.as_str(),
            });
        }
        if let Some(appeal_id) = read::<String>(tx.index, &appeal_key(&transfer.id))? {
            return abort(WorkflowError::DuplicateAppeal {
                transfer_id: transfer.id.clone(),
                appeal_id,
            });
        }

        let id = guard(new_uuid_to_bech32(APPEAL_HRP).map_err(WorkflowError::from))?;
        let appeal = AppealCase {
            id,
            transfer_id: transfer.id.clone(),
            submitted_by: submitted_by.id.clone(),
            status: AppealStatus::Pending,
            appeal_reason: reason.to_string(),
            supporting_document: document,
            reviewer: None,
            review_date: None,
            review_notes: None,
            requires_federation_approval: false,
            federation_reviewer: None,
            federation_review_date: None,
            federation_review_notes: None,
            submission_date: TimeStamp::new(),
        };

        write(tx.appeals, &appeal.id, &appeal)?;
        write(tx.index, &appeal_key(&transfer.id), &appeal.id)?;
        stage_event(
            tx,
            transfer_event(&transfer, EventKind::AppealCreated, &submitted_by.id, &appeal.id),
        )?;

        Ok(appeal)
    }

    /// Club-level decision that the appeal has merit.
    ///
    /// Escalation leaves the ledger untouched; otherwise the transfer is
    /// approved in this same transaction.
    pub fn uphold(
        &self,
        tx: &Tx<'_>,
        reviewer: &Actor,
        appeal_id: &str,
        notes: &str,
        requires_federation: bool,
    ) -> TxResult<AppealDecision> {
        let (mut appeal, transfer) = self.load_with_transfer(tx, appeal_id)?;
        guard(self.policy.check(
            reviewer,
            Action::UpholdAppeal,
            &Target::submission(&transfer.from_club, &appeal.submitted_by),
        ))?;

        if appeal.status != AppealStatus::Pending {
            return abort(appeal.invalid_transition("uphold"));
        }

        let escalate = requires_federation || self.escalation == EscalationPolicy::Mandatory;
        appeal.stamp_review(&reviewer.id, notes);
        appeal.requires_federation_approval = escalate;

        let transfer = if escalate {
            appeal.status = AppealStatus::Escalated;
            stage_event(
                tx,
                transfer_event(&transfer, EventKind::AppealEscalated, &reviewer.id, &appeal.id),
            )?;
            transfer
        } else {
            appeal.status = AppealStatus::Upheld;
            stage_event(
                tx,
                transfer_event(&transfer, EventKind::AppealUpheld, &reviewer.id, &appeal.id),
            )?;
            self.transfers.approve_on_appeal(tx, transfer, &reviewer.id)?
        };

        write(tx.appeals, &appeal.id, &appeal)?;
        Ok(AppealDecision { appeal, transfer })
    }

    /// The transfer stays REJECTED for good.
    pub fn dismiss(
        &self,
        tx: &Tx<'_>,
        reviewer: &Actor,
        appeal_id: &str,
        notes: &str,
    ) -> TxResult<AppealCase> {
        let (mut appeal, transfer) = self.load_with_transfer(tx, appeal_id)?;
        guard(self.policy.check(
            reviewer,
            Action::DismissAppeal,
            &Target::submission(&transfer.from_club, &appeal.submitted_by),
        ))?;

        if appeal.status != AppealStatus::Pending {
            return abort(appeal.invalid_transition("dismiss"));
        }

        appeal.status = AppealStatus::Dismissed;
        appeal.stamp_review(&reviewer.id, notes);
        write(tx.appeals, &appeal.id, &appeal)?;
        stage_event(
            tx,
            transfer_event(&transfer, EventKind::AppealDismissed, &reviewer.id, &appeal.id),
        )?;

        Ok(appeal)
    }

    pub fn withdraw(
        &self,
        tx: &Tx<'_>,
        submitted_by: &Actor,
        appeal_id: &str,
    ) -> TxResult<AppealCase> {
        let (mut appeal, transfer) = self.load_with_transfer(tx, appeal_id)?;
        guard(self.policy.check(
            submitted_by,
            Action::WithdrawAppeal,
            &Target::submission(&transfer.from_club, &appeal.submitted_by),
        ))?;

        if appeal.status != AppealStatus::Pending {
            return abort(appeal.invalid_transition("withdraw"));
        }

        appeal.status = AppealStatus::Withdrawn;
        write(tx.appeals, &appeal.id, &appeal)?;
        stage_event(
            tx,
            transfer_event(&transfer, EventKind::AppealWithdrawn, &submitted_by.id, &appeal.id),
        )?;

        Ok(appeal)
    }

    /// Final federation decision on an escalated appeal.
    pub fn federation_review(
        &self,
        tx: &Tx<'_>,
        federation_reviewer: &Actor,
        appeal_id: &str,
        approved: bool,
        notes: &str,
    ) -> TxResult<AppealDecision> {
        let (mut appeal, transfer) = self.load_with_transfer(tx, appeal_id)?;
        guard(self.policy.check(
            federation_reviewer,
            Action::FederationReview,
            &Target::submission(&transfer.from_club, &appeal.submitted_by),
        ))?;

        if appeal.status != AppealStatus::Escalated {
            return abort(appeal.invalid_transition("review at federation level"));
        }

        appeal.federation_reviewer = Some(federation_reviewer.id.clone());
        appeal.federation_review_date = Some(TimeStamp::new());
        appeal.federation_review_notes = Some(notes.to_string());
        stage_event(
            tx,
            transfer_event(
                &transfer,
                EventKind::FederationDecision { approved },
                &federation_reviewer.id,
                &appeal.id,
            ),
        )?;

        let transfer = if approved {
            appeal.status = AppealStatus::FederationApproved;
            self.transfers
                .approve_on_appeal(tx, transfer, &federation_reviewer.id)?
        } else {
            appeal.status = AppealStatus::FederationRejected;
            transfer
        };

        write(tx.appeals, &appeal.id, &appeal)?;
        Ok(AppealDecision { appeal, transfer })
    }
}

fn transfer_event(
    transfer: &TransferRequest,
    kind: EventKind,
    actor: &str,
    appeal_id: &str,
) -> WorkflowEvent {
    WorkflowEvent::new(kind, actor, &transfer.player_id, &transfer.id)
        .with_appeal(appeal_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_reference_hashes_contents() {
        let doc = SupportingDocument::from_bytes("clearance.pdf", b"signed clearance");
        let again = SupportingDocument::from_bytes("clearance.pdf", b"signed clearance");
        let other = SupportingDocument::from_bytes("clearance.pdf", b"unsigned clearance");

        assert_eq!(doc, again);
        assert_ne!(doc.sha256, other.sha256);
        assert_eq!(doc.sha256.len(), 64);
    }

    #[test]
    fn escalated_is_the_only_open_state_besides_pending() {
        let open: Vec<_> = [
            AppealStatus::Pending,
            AppealStatus::Upheld,
            AppealStatus::Dismissed,
            AppealStatus::Withdrawn,
            AppealStatus::Escalated,
            AppealStatus::FederationApproved,
            AppealStatus::FederationRejected,
        ]
        .into_iter()
        .filter(|status| !status.is_terminal())
        .collect();

        assert_eq!(open, vec![AppealStatus::Pending, AppealStatus::Escalated]);
    }
}

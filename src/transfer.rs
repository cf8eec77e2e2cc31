//! Transfer requests and their review.
//!
//! A request snapshots the player's releasing club at creation. Approval
//! re-checks that snapshot against the ledger inside the approving
//! transaction, so a request that went stale stays PENDING instead of moving
//! a player out of a club they no longer belong to.
use crate::directory::MembershipDirectory;
use crate::error::WorkflowError;
use crate::events::{EventKind, FeeCommand, OutboxMessage, WorkflowEvent, stage, stage_event};
use crate::policy::{Action, Actor, AuthorizationPolicy, Target};
use crate::registration::RegistrationLedger;
use crate::store::{Tx, TxResult, abort, guard, pending_key, read, remove, write};
use crate::types::{ClubId, PlayerId, TimeStamp, UserId};
use crate::utils::{TRANSFER_HRP, new_uuid_to_bech32};
use chrono::Utc;
use std::sync::Arc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    Rejected,
    #[n(3)]
    Cancelled,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::Approved => "APPROVED",
            TransferStatus::Rejected => "REJECTED",
            TransferStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransferStatus::Pending)
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    #[n(0)]
    pub id: String, // bech32, `transfer_` prefix
    #[n(1)]
    pub player_id: PlayerId,
    #[n(2)]
    pub from_club: ClubId, // snapshot of the active club at request time
    #[n(3)]
    pub to_club: ClubId,
    #[n(4)]
    pub status: TransferStatus,
    #[n(5)]
    pub request_date: TimeStamp<Utc>,
    #[n(6)]
    pub transfer_fee: u64, // minor currency units, 0 = no fee
    #[n(7)]
    pub reason: String,
    #[n(8)]
    pub requested_by: UserId,
    #[n(9)]
    pub approver: Option<UserId>,
    #[n(10)]
    pub approval_date: Option<TimeStamp<Utc>>,
    #[n(11)]
    pub rejection_reason: Option<String>,
    #[n(12)]
    pub rejected_by: Option<UserId>,
    #[n(13)]
    pub rejection_date: Option<TimeStamp<Utc>>,
    #[n(14)]
    pub cancelled_by: Option<UserId>,
}

impl TransferRequest {
    fn invalid_transition(&self, action: &'static str) -> WorkflowError {
        WorkflowError::InvalidStateTransition {
            entity: self.id.clone(),
            from: self.status.as_str(),
            action,
        }
    }

    fn event(&self, kind: EventKind, actor: &str) -> WorkflowEvent {
        WorkflowEvent::new(kind, actor, &self.player_id, &self.id)
    }
}

/// What a club administrator fills in to request a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSubmission {
    pub player_id: PlayerId,
    pub to_club: ClubId,
    pub transfer_fee: u64,
    pub reason: String,
}

impl TransferSubmission {
    pub fn new(player_id: impl Into<PlayerId>, to_club: impl Into<ClubId>) -> Self {
        Self {
            player_id: player_id.into(),
            to_club: to_club.into(),
            transfer_fee: 0,
            reason: String::new(),
        }
    }
    pub fn set_fee(mut self, transfer_fee: u64) -> Self {
        self.transfer_fee = transfer_fee;
        self
    }
    pub fn set_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }
}

#[derive(Clone)]
pub struct TransferRequestManager {
    ledger: RegistrationLedger,
    directory: Arc<dyn MembershipDirectory>,
    policy: AuthorizationPolicy,
}

impl TransferRequestManager {
    pub fn new(
        ledger: RegistrationLedger,
        directory: Arc<dyn MembershipDirectory>,
        policy: AuthorizationPolicy,
    ) -> Self {
        Self {
            ledger,
            directory,
            policy,
        }
    }

    pub fn load(&self, tx: &Tx<'_>, transfer_id: &str) -> TxResult<TransferRequest> {
        match read(tx.transfers, transfer_id)? {
            Some(transfer) => Ok(transfer),
            None => abort(WorkflowError::TransferNotFound(transfer_id.to_string())),
        }
    }

    pub fn create(
        &self,
        tx: &Tx<'_>,
        requested_by: &Actor,
        submission: &TransferSubmission,
    ) -> TxResult<TransferRequest> {
        let player_id = submission.player_id.as_str();

        let Some(player) = self.directory.player(player_id) else {
            return abort(WorkflowError::PlayerNotFound(player_id.to_string()));
        };
        if !player.is_eligible() {
            return abort(WorkflowError::PlayerNotEligible(player_id.to_string()));
        }

        let Some(active) = self.ledger.get_active_registration(tx, player_id)? else {
            return abort(WorkflowError::NoActiveRegistration(player_id.to_string()));
        };
        if active.club_id == submission.to_club {
            return abort(WorkflowError::SameClubTransfer(submission.to_club.clone()));
        }
        if !self.directory.club_exists(&submission.to_club) {
            return abort(WorkflowError::UnknownClub(submission.to_club.clone()));
        }

        if let Some(transfer_id) = read::<String>(tx.index, &pending_key(player_id))? {
            return abort(WorkflowError::DuplicatePendingTransfer {
                player: player_id.to_string(),
                transfer_id,
            });
        }

        guard(self.policy.check(
            requested_by,
            Action::CreateTransfer,
            &Target::club(&active.club_id),
        ))?;

        let id = guard(new_uuid_to_bech32(TRANSFER_HRP).map_err(WorkflowError::from))?;
        let transfer = TransferRequest {
            id,
            player_id: player_id.to_string(),
            from_club: active.club_id,
            to_club: submission.to_club.clone(),
            status: TransferStatus::Pending,
            request_date: TimeStamp::new(),
            transfer_fee: submission.transfer_fee,
            reason: submission.reason.clone(),
            requested_by: requested_by.id.clone(),
            approver: None,
            approval_date: None,
            rejection_reason: None,
            rejected_by: None,
            rejection_date: None,
            cancelled_by: None,
        };

        write(tx.transfers, &transfer.id, &transfer)?;
        write(tx.index, &pending_key(player_id), &transfer.id)?;
        stage_event(tx, transfer.event(EventKind::TransferCreated, &requested_by.id))?;

        Ok(transfer)
    }

    pub fn approve(
        &self,
        tx: &Tx<'_>,
        approver: &Actor,
        transfer_id: &str,
    ) -> TxResult<TransferRequest> {
        let transfer = self.load(tx, transfer_id)?;
        guard(self.policy.check(
            approver,
            Action::ApproveTransfer,
            &Target::submission(&transfer.from_club, &transfer.requested_by),
        ))?;

        if transfer.status.is_terminal() {
            return abort(transfer.invalid_transition("approve"));
        }

        self.commit_approval(tx, transfer, &approver.id)
    }

    /// Approval reached through an upheld appeal. The transfer was REJECTED,
    /// and from here on takes the same path as a direct approval.
    pub(crate) fn approve_on_appeal(
        &self,
        tx: &Tx<'_>,
        transfer: TransferRequest,
        reviewer: &str,
    ) -> TxResult<TransferRequest> {
        if transfer.status != TransferStatus::Rejected {
            return abort(transfer.invalid_transition("approve on appeal"));
        }

        self.commit_approval(tx, transfer, reviewer)
    }

    fn commit_approval(
        &self,
        tx: &Tx<'_>,
        mut transfer: TransferRequest,
        approver: &str,
    ) -> TxResult<TransferRequest> {
        // aborts with StaleLedgerState when the player left `from_club` meanwhile
        let now = TimeStamp::new();
        self.ledger.apply_transfer(
            tx,
            &transfer.player_id,
            &transfer.from_club,
            &transfer.to_club,
            now.clone(),
        )?;

        transfer.status = TransferStatus::Approved;
        transfer.approver = Some(approver.to_string());
        transfer.approval_date = Some(now);
        write(tx.transfers, &transfer.id, &transfer)?;
        self.release_pending(tx, &transfer)?;

        stage_event(tx, transfer.event(EventKind::TransferApproved, approver))?;
        if transfer.transfer_fee > 0 {
            stage(
                tx,
                OutboxMessage::ChargeFee(FeeCommand {
                    player_id: transfer.player_id.clone(),
                    transfer_fee: transfer.transfer_fee,
                    transfer_id: transfer.id.clone(),
                }),
            )?;
        }

        Ok(transfer)
    }

    pub fn reject(
        &self,
        tx: &Tx<'_>,
        approver: &Actor,
        transfer_id: &str,
        reason: &str,
    ) -> TxResult<TransferRequest> {
        let mut transfer = self.load(tx, transfer_id)?;
        guard(self.policy.check(
            approver,
            Action::RejectTransfer,
            &Target::submission(&transfer.from_club, &transfer.requested_by),
        ))?;

        if transfer.status.is_terminal() {
            return abort(transfer.invalid_transition("reject"));
        }

        transfer.status = TransferStatus::Rejected;
        transfer.rejection_reason = Some(reason.to_string());
        transfer.rejected_by = Some(approver.id.clone());
        transfer.rejection_date = Some(TimeStamp::new());
        write(tx.transfers, &transfer.id, &transfer)?;
        self.release_pending(tx, &transfer)?;
        stage_event(tx, transfer.event(EventKind::TransferRejected, &approver.id))?;

        Ok(transfer)
    }

    pub fn cancel(
        &self,
        tx: &Tx<'_>,
        requested_by: &Actor,
        transfer_id: &str,
    ) -> TxResult<TransferRequest> {
        let mut transfer = self.load(tx, transfer_id)?;
        guard(self.policy.check(
            requested_by,
            Action::CancelTransfer,
            &Target::submission(&transfer.from_club, &transfer.requested_by),
        ))?;

        if transfer.status.is_terminal() {
            return abort(transfer.invalid_transition("cancel"));
        }

        transfer.status = TransferStatus::Cancelled;
        transfer.cancelled_by = Some(requested_by.id.clone());
        write(tx.transfers, &transfer.id, &transfer)?;
        self.release_pending(tx, &transfer)?;
        stage_event(tx, transfer.event(EventKind::TransferCancelled, &requested_by.id))?;

        Ok(transfer)
    }

    // only clear the pending slot if it still belongs to this transfer
    fn release_pending(&self, tx: &Tx<'_>, transfer: &TransferRequest) -> TxResult<()> {
        let key = pending_key(&transfer.player_id);
        if read::<String>(tx.index, &key)?.as_deref() == Some(transfer.id.as_str()) {
            remove(tx.index, &key)?;
        }
        Ok(())
    }
}

//! Service layer API for the transfer and appeal workflow
use crate::appeal::{AppealCase, AppealCaseManager, AppealDecision, SupportingDocument};
use crate::config::WorkflowConfig;
use crate::directory::MembershipDirectory;
use crate::error::{WorkflowError, WorkflowResult};
use crate::events::{BillingGateway, DispatchReport, NotificationGateway, Outbox, OutboxMessage};
use crate::policy::{Actor, AuthorizationPolicy};
use crate::query::{AppealQuery, TransferQuery, list_appeals, list_transfers};
use crate::registration::{RegistrationLedger, RegistrationRecord};
use crate::store::{Store, Tx, TxResult, appeal_key};
use crate::transfer::{TransferRequest, TransferRequestManager, TransferSubmission};
use crate::types::TimeStamp;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct WorkflowFacade {
    store: Store,
    ledger: RegistrationLedger,
    transfers: TransferRequestManager,
    appeals: AppealCaseManager,
    outbox: Outbox,
}

impl WorkflowFacade {
    pub fn new(
        store: Store,
        directory: Arc<dyn MembershipDirectory>,
        config: &WorkflowConfig,
    ) -> Self {
        let policy = AuthorizationPolicy::new();
        let ledger = RegistrationLedger::new(directory.clone());
        let transfers = TransferRequestManager::new(ledger.clone(), directory, policy);
        let appeals = AppealCaseManager::new(transfers.clone(), policy, config.escalation);

        Self {
            store,
            ledger,
            transfers,
            appeals,
            outbox: Outbox::default(),
        }
    }

    /// Open the configured sled database and build the facade on top of it.
    pub fn open(
        config: &WorkflowConfig,
        directory: Arc<dyn MembershipDirectory>,
    ) -> WorkflowResult<Self> {
        let store = Store::open(&config.storage)?;
        Ok(Self::new(store, directory, config))
    }

    pub fn with_gateways(
        mut self,
        notifier: Arc<dyn NotificationGateway>,
        billing: Arc<dyn BillingGateway>,
    ) -> Self {
        self.outbox = Outbox::new(notifier, billing);
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Run one atomic unit, report its outcome, then hand staged messages on.
    fn commit<T, F>(&self, operation: &'static str, actor: &str, f: F) -> WorkflowResult<T>
    where
        F: Fn(&Tx<'_>) -> TxResult<T>,
    {
        match self.store.atomically(f) {
            Ok(value) => {
                if let Err(err) = self.outbox.dispatch(&self.store) {
                    warn!(operation, error = %err, "outbox dispatch failed after commit");
                }
                Ok(value)
            }
            Err(err) => {
                if err.is_recoverable() {
                    warn!(operation, actor, code = err.code(), error = %err, "ledger moved underneath request");
                } else if err.is_business_rule() {
                    debug!(operation, actor, code = err.code(), error = %err, "request refused");
                } else {
                    error!(operation, actor, error = %err, "transaction rolled back");
                }
                Err(err)
            }
        }
    }

    /// Seed a player's first club registration.
    pub fn register_player(&self, player_id: &str, club_id: &str) -> WorkflowResult<RegistrationRecord> {
        let record = self.commit("register", "system", |tx| {
            self.ledger.register(tx, player_id, club_id, TimeStamp::new())
        })?;

        info!(player_id, club_id, "player registered");
        Ok(record)
    }

    pub fn submit_transfer(
        &self,
        actor: &Actor,
        submission: &TransferSubmission,
    ) -> WorkflowResult<TransferRequest> {
        let transfer = self.commit("create transfer", &actor.id, |tx| {
            self.transfers.create(tx, actor, submission)
        })?;

        info!(
            transfer_id = %transfer.id,
            player_id = %transfer.player_id,
            from_club = %transfer.from_club,
            to_club = %transfer.to_club,
            actor = %actor.id,
            "transfer requested"
        );
        Ok(transfer)
    }

    pub fn approve_transfer(&self, actor: &Actor, transfer_id: &str) -> WorkflowResult<TransferRequest> {
        let transfer = self.commit("approve transfer", &actor.id, |tx| {
            self.transfers.approve(tx, actor, transfer_id)
        })?;

        info!(
            transfer_id,
            player_id = %transfer.player_id,
            to_club = %transfer.to_club,
            actor = %actor.id,
            "transfer approved"
        );
        Ok(transfer)
    }

    pub fn reject_transfer(
        &self,
        actor: &Actor,
        transfer_id: &str,
        reason: &str,
    ) -> WorkflowResult<TransferRequest> {
        let transfer = self.commit("reject transfer", &actor.id, |tx| {
            self.transfers.reject(tx, actor, transfer_id, reason)
        })?;

        info!(transfer_id, player_id = %transfer.player_id, actor = %actor.id, "transfer rejected");
        Ok(transfer)
    }

    pub fn cancel_transfer(&self, actor: &Actor, transfer_id: &str) -> WorkflowResult<TransferRequest> {
        let transfer = self.commit("cancel transfer", &actor.id, |tx| {
            self.transfers.cancel(tx, actor, transfer_id)
        })?;

        info!(transfer_id, player_id = %transfer.player_id, actor = %actor.id, "transfer cancelled");
        Ok(transfer)
    }

    pub fn create_appeal(
        &self,
        actor: &Actor,
        transfer_id: &str,
        reason: &str,
        document: Option<SupportingDocument>,
    ) -> WorkflowResult<AppealCase> {
        let appeal = self.commit("create appeal", &actor.id, |tx| {
            self.appeals
                .create_appeal(tx, actor, transfer_id, reason, document.clone())
        })?;

        info!(appeal_id = %appeal.id, transfer_id, actor = %actor.id, "appeal submitted");
        Ok(appeal)
    }

    pub fn uphold_appeal(
        &self,
        actor: &Actor,
        appeal_id: &str,
        notes: &str,
        requires_federation: bool,
    ) -> WorkflowResult<AppealDecision> {
        let decision = self.commit("uphold appeal", &actor.id, |tx| {
            self.appeals
                .uphold(tx, actor, appeal_id, notes, requires_federation)
        })?;

        info!(
            appeal_id,
            transfer_id = %decision.transfer.id,
            status = decision.appeal.status.as_str(),
            actor = %actor.id,
            "appeal upheld"
        );
        Ok(decision)
    }

    pub fn dismiss_appeal(&self, actor: &Actor, appeal_id: &str, notes: &str) -> WorkflowResult<AppealCase> {
        let appeal = self.commit("dismiss appeal", &actor.id, |tx| {
            self.appeals.dismiss(tx, actor, appeal_id, notes)
        })?;

        info!(appeal_id, transfer_id = %appeal.transfer_id, actor = %actor.id, "appeal dismissed");
        Ok(appeal)
    }

    pub fn withdraw_appeal(&self, actor: &Actor, appeal_id: &str) -> WorkflowResult<AppealCase> {
        let appeal = self.commit("withdraw appeal", &actor.id, |tx| {
            self.appeals.withdraw(tx, actor, appeal_id)
        })?;

        info!(appeal_id, transfer_id = %appeal.transfer_id, actor = %actor.id, "appeal withdrawn");
        Ok(appeal)
    }

    pub fn federation_review(
        &self,
        actor: &Actor,
        appeal_id: &str,
        approved: bool,
        notes: &str,
    ) -> WorkflowResult<AppealDecision> {
        let decision = self.commit("federation review", &actor.id, |tx| {
            self.appeals
                .federation_review(tx, actor, appeal_id, approved, notes)
        })?;

        info!(
            appeal_id,
            transfer_id = %decision.transfer.id,
            approved,
            actor = %actor.id,
            "federation decision recorded"
        );
        Ok(decision)
    }

    // read api

    pub fn transfer(&self, transfer_id: &str) -> WorkflowResult<TransferRequest> {
        self.store
            .get(&self.store.transfers, transfer_id)?
            .ok_or_else(|| WorkflowError::TransferNotFound(transfer_id.to_string()))
    }

    pub fn appeal(&self, appeal_id: &str) -> WorkflowResult<AppealCase> {
        self.store
            .get(&self.store.appeals, appeal_id)?
            .ok_or_else(|| WorkflowError::AppealNotFound(appeal_id.to_string()))
    }

    pub fn appeal_for_transfer(&self, transfer_id: &str) -> WorkflowResult<Option<AppealCase>> {
        match self.store.get::<String>(&self.store.index, &appeal_key(transfer_id))? {
            Some(appeal_id) => self.appeal(&appeal_id).map(Some),
            None => Ok(None),
        }
    }

    pub fn active_registration(&self, player_id: &str) -> WorkflowResult<Option<RegistrationRecord>> {
        self.ledger.active(&self.store, player_id)
    }

    pub fn registration_history(&self, player_id: &str) -> WorkflowResult<Vec<RegistrationRecord>> {
        self.ledger.history(&self.store, player_id)
    }

    pub fn list_transfers(&self, query: &TransferQuery) -> WorkflowResult<Vec<TransferRequest>> {
        list_transfers(&self.store, query)
    }

    pub fn list_appeals(&self, query: &AppealQuery) -> WorkflowResult<Vec<AppealCase>> {
        list_appeals(&self.store, query)
    }

    // outbox

    pub fn dispatch_outbox(&self) -> WorkflowResult<DispatchReport> {
        self.outbox.dispatch(&self.store)
    }

    pub fn undelivered(&self) -> WorkflowResult<Vec<OutboxMessage>> {
        self.outbox.undelivered(&self.store)
    }

    /// Caller-driven retry of messages that failed delivery earlier.
    pub fn redeliver_undelivered(&self) -> WorkflowResult<DispatchReport> {
        self.outbox.redeliver(&self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appeal::AppealStatus;
    use crate::directory::{InMemoryDirectory, Player};
    use crate::store::active_key;
    use crate::transfer::TransferStatus;

    fn facade() -> WorkflowFacade {
        let directory = InMemoryDirectory::new();
        directory.add_club("club_a");
        directory.add_club("club_b");
        directory.add_player(Player::new("player_p", "P. Example"));

        let db = sled::Config::new().temporary(true).open().unwrap();
        let store = Store::new(Arc::new(db)).unwrap();
        WorkflowFacade::new(store, Arc::new(directory), &WorkflowConfig::default())
    }

    #[test]
    fn codec_failure_rolls_back_the_whole_uphold() {
        let facade = facade();
        let admin = Actor::club_admin("admin_a", "club_a");
        let reviewer = Actor::national_admin("national");

        facade.register_player("player_p", "club_a").unwrap();
        let transfer = facade
            .submit_transfer(&admin, &TransferSubmission::new("player_p", "club_b"))
            .unwrap();
        facade.reject_transfer(&reviewer, &transfer.id, "no").unwrap();
        let appeal = facade.create_appeal(&admin, &transfer.id, "yes", None).unwrap();
        assert!(facade.store.outbox.is_empty());

        // the ledger record is only read once the appeal and its event are staged
        let record_key: String = facade
            .store
            .get(&facade.store.index, &active_key("player_p"))
            .unwrap()
            .unwrap();
        facade
            .store
            .registrations
            .insert(record_key.as_bytes(), &[0xff, 0x00][..])
            .unwrap();

        let err = facade
            .uphold_appeal(&reviewer, &appeal.id, "merit", false)
            .unwrap_err();
        assert_eq!(err.code(), "CODEC_ERROR");

        let appeal = facade.appeal(&appeal.id).unwrap();
        assert_eq!(appeal.status, AppealStatus::Pending);
        assert!(appeal.reviewer.is_none());
        assert_eq!(facade.transfer(&transfer.id).unwrap().status, TransferStatus::Rejected);
        assert!(facade.store.outbox.is_empty());
        assert!(facade.undelivered().unwrap().is_empty());
    }
}

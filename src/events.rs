//! Outbound events and commands.
//!
//! Managers stage messages into the `outbox` tree inside the same transaction
//! as the state change they describe. Delivery to the notification gateway
//! and to billing only happens after commit, through [`Outbox::dispatch`], so a
//! failing downstream can never roll back a decision.
use crate::error::WorkflowResult;
use crate::store::{Store, Tx, TxResult, decode, write};
use crate::types::{PlayerId, TimeStamp, UserId};
use crate::utils::new_ordered_key;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    #[n(0)]
    TransferCreated,
    #[n(1)]
    TransferApproved,
    #[n(2)]
    TransferRejected,
    #[n(3)]
    TransferCancelled,
    #[n(4)]
    AppealCreated,
    #[n(5)]
    AppealUpheld,
    #[n(6)]
    AppealDismissed,
    #[n(7)]
    AppealWithdrawn,
    #[n(8)]
    AppealEscalated,
    #[n(9)]
    FederationDecision {
        #[n(0)]
        approved: bool,
    },
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct WorkflowEvent {
    #[n(0)]
    pub kind: EventKind,
    #[n(1)]
    pub actor: UserId,
    #[n(2)]
    pub timestamp: TimeStamp<Utc>,
    #[n(3)]
    pub player_id: PlayerId,
    #[n(4)]
    pub transfer_id: String,
    #[n(5)]
    pub appeal_id: Option<String>,
}

impl WorkflowEvent {
    pub fn new(kind: EventKind, actor: &str, player_id: &str, transfer_id: &str) -> Self {
        Self {
            kind,
            actor: actor.to_string(),
            timestamp: TimeStamp::new(),
            player_id: player_id.to_string(),
            transfer_id: transfer_id.to_string(),
            appeal_id: None,
        }
    }

    pub fn with_appeal(mut self, appeal_id: &str) -> Self {
        self.appeal_id = Some(appeal_id.to_string());
        self
    }
}

/// Instruction for billing to attach a fee to an approved transfer.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct FeeCommand {
    #[n(0)]
    pub player_id: PlayerId,
    #[n(1)]
    pub transfer_fee: u64,
    #[n(2)]
    pub transfer_id: String,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum OutboxMessage {
    #[n(0)]
    Notify(#[n(0)] WorkflowEvent),
    #[n(1)]
    ChargeFee(#[n(0)] FeeCommand),
}

pub trait NotificationGateway: Send + Sync {
    fn publish(&self, event: &WorkflowEvent) -> anyhow::Result<()>;
}

pub trait BillingGateway: Send + Sync {
    fn attach_transfer_fee(&self, command: &FeeCommand) -> anyhow::Result<()>;
}

/// Writes every message to the log and reports success.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingGateway;

impl NotificationGateway for TracingGateway {
    fn publish(&self, event: &WorkflowEvent) -> anyhow::Result<()> {
        info!(
            kind = ?event.kind,
            actor = %event.actor,
            transfer_id = %event.transfer_id,
            appeal_id = ?event.appeal_id,
            "workflow event"
        );
        Ok(())
    }
}

impl BillingGateway for TracingGateway {
    fn attach_transfer_fee(&self, command: &FeeCommand) -> anyhow::Result<()> {
        info!(
            player_id = %command.player_id,
            transfer_id = %command.transfer_id,
            fee = command.transfer_fee,
            "transfer fee command"
        );
        Ok(())
    }
}

pub(crate) fn stage(tx: &Tx<'_>, message: OutboxMessage) -> TxResult<()> {
    write(tx.outbox, &new_ordered_key(), &message)
}

pub(crate) fn stage_event(tx: &Tx<'_>, event: WorkflowEvent) -> TxResult<()> {
    stage(tx, OutboxMessage::Notify(event))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct Outbox {
    notifier: Arc<dyn NotificationGateway>,
    billing: Arc<dyn BillingGateway>,
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new(Arc::new(TracingGateway), Arc::new(TracingGateway))
    }
}

impl Outbox {
    pub fn new(notifier: Arc<dyn NotificationGateway>, billing: Arc<dyn BillingGateway>) -> Self {
        Self { notifier, billing }
    }

    fn deliver(&self, message: &OutboxMessage) -> anyhow::Result<()> {
        match message {
            OutboxMessage::Notify(event) => self.notifier.publish(event),
            OutboxMessage::ChargeFee(command) => self.billing.attach_transfer_fee(command),
        }
    }

    /// Deliver everything staged so far, oldest first.
    ///
    /// A message is claimed by removing it from the outbox, so concurrent
    /// dispatchers never deliver the same message twice. Failures are parked
    /// in `undelivered`; nothing here retries them.
    pub fn dispatch(&self, store: &Store) -> WorkflowResult<DispatchReport> {
        self.drain(store, &store.outbox)
    }

    /// One explicit pass over previously failed messages.
    pub fn redeliver(&self, store: &Store) -> WorkflowResult<DispatchReport> {
        self.drain(store, &store.undelivered)
    }

    pub fn undelivered(&self, store: &Store) -> WorkflowResult<Vec<OutboxMessage>> {
        store.scan(&store.undelivered, "")
    }

    fn drain(&self, store: &Store, source: &sled::Tree) -> WorkflowResult<DispatchReport> {
        let mut report = DispatchReport::default();
        let keys: Vec<sled::IVec> = source
            .iter()
            .keys()
            .collect::<Result<_, sled::Error>>()?;

        for key in keys {
            let Some(bytes) = source.remove(&key)? else {
                continue; // claimed by another dispatcher
            };

            let outcome = decode::<OutboxMessage>(&bytes)
                .map_err(anyhow::Error::from)
                .and_then(|message| self.deliver(&message));

            match outcome {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    warn!(error = %err, "outbox delivery failed, parking message");
                    store.undelivered.insert(&key, bytes)?;
                    report.failed += 1;
                }
            }
        }

        if report.delivered + report.failed > 0 {
            debug!(delivered = report.delivered, failed = report.failed, "outbox drained");
        }
        Ok(report)
    }
}

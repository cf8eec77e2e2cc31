//! Read-side filters for dashboards and tooling. Nothing here writes.
use crate::appeal::{AppealCase, AppealStatus};
use crate::error::WorkflowResult;
use crate::store::Store;
use crate::transfer::{TransferRequest, TransferStatus};
use crate::types::{ClubId, PlayerId, TimeStamp};
use chrono::Utc;

/// Inclusive date window; open on either side when unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<TimeStamp<Utc>>,
    pub to: Option<TimeStamp<Utc>>,
}

impl DateRange {
    pub fn contains(&self, date: &TimeStamp<Utc>) -> bool {
        self.from.as_ref().is_none_or(|from| from <= date)
            && self.to.as_ref().is_none_or(|to| date <= to)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransferQuery {
    pub player: Option<PlayerId>,
    /// Matches either side of the transfer.
    pub club: Option<ClubId>,
    pub status: Option<TransferStatus>,
    pub dates: DateRange,
}

impl TransferQuery {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn player(mut self, player: impl Into<PlayerId>) -> Self {
        self.player = Some(player.into());
        self
    }
    pub fn club(mut self, club: impl Into<ClubId>) -> Self {
        self.club = Some(club.into());
        self
    }
    pub fn status(mut self, status: TransferStatus) -> Self {
        self.status = Some(status);
        self
    }
    pub fn between(mut self, from: Option<TimeStamp<Utc>>, to: Option<TimeStamp<Utc>>) -> Self {
        self.dates = DateRange { from, to };
        self
    }

    pub fn matches(&self, transfer: &TransferRequest) -> bool {
        self.player.as_ref().is_none_or(|p| *p == transfer.player_id)
            && self
                .club
                .as_ref()
                .is_none_or(|c| *c == transfer.from_club || *c == transfer.to_club)
            && self.status.is_none_or(|s| s == transfer.status)
            && self.dates.contains(&transfer.request_date)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppealQuery {
    pub player: Option<PlayerId>,
    pub club: Option<ClubId>,
    pub status: Option<AppealStatus>,
    pub dates: DateRange,
}

impl AppealQuery {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn player(mut self, player: impl Into<PlayerId>) -> Self {
        self.player = Some(player.into());
        self
    }
    pub fn club(mut self, club: impl Into<ClubId>) -> Self {
        self.club = Some(club.into());
        self
    }
    pub fn status(mut self, status: AppealStatus) -> Self {
        self.status = Some(status);
        self
    }
    pub fn between(mut self, from: Option<TimeStamp<Utc>>, to: Option<TimeStamp<Utc>>) -> Self {
        self.dates = DateRange { from, to };
        self
    }

    /// Player and club come from the appealed transfer.
    pub fn matches(&self, appeal: &AppealCase, transfer: &TransferRequest) -> bool {
        let by_transfer = TransferQuery {
            player: self.player.clone(),
            club: self.club.clone(),
            status: None,
            dates: DateRange::default(),
        };

        by_transfer.matches(transfer)
            && self.status.is_none_or(|s| s == appeal.status)
            && self.dates.contains(&appeal.submission_date)
    }
}

pub fn list_transfers(store: &Store, query: &TransferQuery) -> WorkflowResult<Vec<TransferRequest>> {
    let mut transfers: Vec<TransferRequest> = store
        .scan(&store.transfers, "")?
        .into_iter()
        .filter(|transfer| query.matches(transfer))
        .collect();
    transfers.sort_by(|a, b| a.request_date.cmp(&b.request_date));
    Ok(transfers)
}

pub fn list_appeals(store: &Store, query: &AppealQuery) -> WorkflowResult<Vec<AppealCase>> {
    let mut appeals = vec![];
    for appeal in store.scan::<AppealCase>(&store.appeals, "")? {
        let Some(transfer) = store.get::<TransferRequest>(&store.transfers, &appeal.transfer_id)? else {
            continue;
        };
        if query.matches(&appeal, &transfer) {
            appeals.push(appeal);
        }
    }
    appeals.sort_by(|a, b| a.submission_date.cmp(&b.submission_date));
    Ok(appeals)
}

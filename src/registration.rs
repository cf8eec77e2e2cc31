//! The registration ledger: which club each player currently belongs to.
//!
//! Records live in the `registrations` tree under `{player}/{record_id}`; the
//! `active/{player}` index entry points at the single ACTIVE record. Keeping
//! that pointer and the record statuses in one transaction is what holds the
//! one-active-record-per-player invariant.
use crate::directory::MembershipDirectory;
use crate::error::{WorkflowError, WorkflowResult};
use crate::store::{Store, Tx, TxResult, abort, active_key, read, write};
use crate::types::{ClubId, PlayerId, TimeStamp};
use crate::utils::new_ordered_key;
use chrono::Utc;
use std::sync::Arc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
    #[n(0)]
    Active,
    #[n(1)]
    Inactive,
    #[n(2)]
    Transferred,
    #[n(3)]
    Suspended,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRecord {
    #[n(0)]
    pub id: String, // uuid7, time ordered
    #[n(1)]
    pub player_id: PlayerId,
    #[n(2)]
    pub club_id: ClubId,
    #[n(3)]
    pub status: RegistrationStatus,
    #[n(4)]
    pub registration_date: TimeStamp<Utc>,
}

impl RegistrationRecord {
    fn new(player_id: &str, club_id: &str, registration_date: TimeStamp<Utc>) -> Self {
        Self {
            id: new_ordered_key(),
            player_id: player_id.to_string(),
            club_id: club_id.to_string(),
            status: RegistrationStatus::Active,
            registration_date,
        }
    }

    pub fn key(&self) -> String {
        format!("{}/{}", self.player_id, self.id)
    }

    pub fn is_active(&self) -> bool {
        self.status == RegistrationStatus::Active
    }
}

#[derive(Clone)]
pub struct RegistrationLedger {
    directory: Arc<dyn MembershipDirectory>,
}

impl RegistrationLedger {
    pub fn new(directory: Arc<dyn MembershipDirectory>) -> Self {
        Self { directory }
    }

    pub fn get_active_registration(
        &self,
        tx: &Tx<'_>,
        player_id: &str,
    ) -> TxResult<Option<RegistrationRecord>> {
        match read::<String>(tx.index, &active_key(player_id))? {
            Some(record_key) => read(tx.registrations, &record_key),
            None => Ok(None),
        }
    }

    /// Move the player from `from_club` to `to_club`.
    ///
    /// Compares the ACTIVE record's club against `from_club` first; a mismatch
    /// means the ledger moved since the caller validated, and nothing is written.
    pub fn apply_transfer(
        &self,
        tx: &Tx<'_>,
        player_id: &str,
        from_club: &str,
        to_club: &str,
        effective_date: TimeStamp<Utc>,
    ) -> TxResult<(RegistrationRecord, RegistrationRecord)> {
        let current = self.get_active_registration(tx, player_id)?;

        let mut old_record = match current {
            Some(record) if record.club_id == from_club => record,
            other => {
                return abort(WorkflowError::StaleLedgerState {
                    player: player_id.to_string(),
                    expected: from_club.to_string(),
                    found: other.map(|record| record.club_id),
                });
            }
        };

        old_record.status = RegistrationStatus::Transferred;
        write(tx.registrations, &old_record.key(), &old_record)?;

        let new_record = RegistrationRecord::new(player_id, to_club, effective_date);
        write(tx.registrations, &new_record.key(), &new_record)?;
        write(tx.index, &active_key(player_id), &new_record.key())?;

        Ok((old_record, new_record))
    }

    /// First registration of a player with a club.
    pub fn register(
        &self,
        tx: &Tx<'_>,
        player_id: &str,
        club_id: &str,
        registration_date: TimeStamp<Utc>,
    ) -> TxResult<RegistrationRecord> {
        if self.directory.player(player_id).is_none() {
            return abort(WorkflowError::PlayerNotFound(player_id.to_string()));
        }
        if !self.directory.club_exists(club_id) {
            return abort(WorkflowError::UnknownClub(club_id.to_string()));
        }
        if self.get_active_registration(tx, player_id)?.is_some() {
            return abort(WorkflowError::DuplicateActiveRegistration(
                player_id.to_string(),
            ));
        }

        let record = RegistrationRecord::new(player_id, club_id, registration_date);
        write(tx.registrations, &record.key(), &record)?;
        write(tx.index, &active_key(player_id), &record.key())?;

        Ok(record)
    }

    pub fn active(&self, store: &Store, player_id: &str) -> WorkflowResult<Option<RegistrationRecord>> {
        match store.get::<String>(&store.index, &active_key(player_id))? {
            Some(record_key) => store.get(&store.registrations, &record_key),
            None => Ok(None),
        }
    }

    /// Every record the player has held, oldest first.
    pub fn history(&self, store: &Store, player_id: &str) -> WorkflowResult<Vec<RegistrationRecord>> {
        let mut records: Vec<RegistrationRecord> =
            store.scan(&store.registrations, &format!("{player_id}/"))?;
        records.sort_by(|a, b| {
            a.registration_date
                .cmp(&b.registration_date)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(records)
    }
}

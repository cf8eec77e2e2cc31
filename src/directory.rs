//! Read-only view onto the membership directory.
//!
//! The workflow never owns player identity or the club roster. It asks the
//! directory whether a player exists and may move, and whether a club exists.
use crate::types::{ClubId, PlayerId};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    Active,
    Inactive,
    Suspended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub display_name: String,
    pub status: PlayerStatus,
}

impl Player {
    pub fn new(id: impl Into<PlayerId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            status: PlayerStatus::Active,
        }
    }

    pub fn with_status(mut self, status: PlayerStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_eligible(&self) -> bool {
        self.status == PlayerStatus::Active
    }
}

pub trait MembershipDirectory: Send + Sync {
    fn player(&self, player_id: &str) -> Option<Player>;
    fn club_exists(&self, club_id: &str) -> bool;
}

/// Directory held in memory, for embedding callers and tests.
#[derive(Default)]
pub struct InMemoryDirectory {
    players: RwLock<HashMap<PlayerId, Player>>,
    clubs: RwLock<HashSet<ClubId>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_club(&self, club_id: impl Into<ClubId>) {
        if let Ok(mut clubs) = self.clubs.write() {
            clubs.insert(club_id.into());
        }
    }

    pub fn add_player(&self, player: Player) {
        if let Ok(mut players) = self.players.write() {
            players.insert(player.id.clone(), player);
        }
    }

    /// Change the flag the directory reports for a player; unknown ids are ignored.
    pub fn set_status(&self, player_id: &str, status: PlayerStatus) {
        if let Ok(mut players) = self.players.write() {
            if let Some(player) = players.get_mut(player_id) {
                player.status = status;
            }
        }
    }
}

impl MembershipDirectory for InMemoryDirectory {
    fn player(&self, player_id: &str) -> Option<Player> {
        self.players.read().ok()?.get(player_id).cloned()
    }

    fn club_exists(&self, club_id: &str) -> bool {
        self.clubs
            .read()
            .map(|clubs| clubs.contains(club_id))
            .unwrap_or(false)
    }
}

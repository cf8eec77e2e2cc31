//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::{TempDir, tempdir};
use transfer_appeal::{
    WorkflowFacade,
    config::WorkflowConfig,
    directory::{InMemoryDirectory, Player},
    events::{BillingGateway, EventKind, FeeCommand, NotificationGateway, WorkflowEvent},
    policy::Actor,
    store::Store,
};

pub const CLUB_A: &str = "club_a";
pub const CLUB_B: &str = "club_b";
pub const CLUB_C: &str = "club_c";
pub const PLAYER_P: &str = "player_p";
pub const PLAYER_Q: &str = "player_q";
pub const PLAYER_UNREGISTERED: &str = "player_u";

/// Records every delivery; can be switched to fail to exercise the outbox.
#[derive(Default)]
pub struct RecordingGateway {
    pub events: Mutex<Vec<WorkflowEvent>>,
    pub fees: Mutex<Vec<FeeCommand>>,
    failing: AtomicBool,
}

impl RecordingGateway {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|event| event.kind.clone())
            .collect()
    }

    pub fn fees(&self) -> Vec<FeeCommand> {
        self.fees.lock().unwrap().clone()
    }
}

impl NotificationGateway for RecordingGateway {
    fn publish(&self, event: &WorkflowEvent) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("notification gateway unavailable");
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

impl BillingGateway for RecordingGateway {
    fn attach_transfer_fee(&self, command: &FeeCommand) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("billing unavailable");
        }
        self.fees.lock().unwrap().push(command.clone());
        Ok(())
    }
}

pub struct Fixture {
    pub facade: WorkflowFacade,
    pub directory: Arc<InMemoryDirectory>,
    pub gateway: Arc<RecordingGateway>,
    // sled holds a file lock; dropping the dir last cleans up the database
    _temp_dir: TempDir,
}

pub fn fixture() -> anyhow::Result<Fixture> {
    fixture_with(WorkflowConfig::default())
}

/// P is registered at club A, Q at club B; U exists but has no club.
pub fn fixture_with(config: WorkflowConfig) -> anyhow::Result<Fixture> {
    let temp_dir = tempdir()?;
    let db = sled::open(temp_dir.path().join("workflow.db"))?;
    let store = Store::new(Arc::new(db))?;

    let directory = Arc::new(InMemoryDirectory::new());
    for club in [CLUB_A, CLUB_B, CLUB_C] {
        directory.add_club(club);
    }
    directory.add_player(Player::new(PLAYER_P, "Player P"));
    directory.add_player(Player::new(PLAYER_Q, "Player Q"));
    directory.add_player(Player::new(PLAYER_UNREGISTERED, "Player U"));

    let gateway = Arc::new(RecordingGateway::default());
    let facade = WorkflowFacade::new(store, directory.clone(), &config)
        .with_gateways(gateway.clone(), gateway.clone());

    facade.register_player(PLAYER_P, CLUB_A)?;
    facade.register_player(PLAYER_Q, CLUB_B)?;

    Ok(Fixture {
        facade,
        directory,
        gateway,
        _temp_dir: temp_dir,
    })
}

pub fn club_admin(club: &str) -> Actor {
    Actor::club_admin(format!("admin_{club}"), club)
}

pub fn national_admin() -> Actor {
    Actor::national_admin("national_admin")
}

pub fn federation_reviewer() -> Actor {
    Actor::federation_reviewer("federation_reviewer")
}

pub fn superuser() -> Actor {
    Actor::superuser("root")
}

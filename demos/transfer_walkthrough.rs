//! Walks a player through a rejected transfer, an appeal and a federation
//! decision, against a temporary sled database.
//!
//! cargo run --example transfer_walkthrough -- config/workflow.yaml
use std::env;
use std::sync::Arc;
use transfer_appeal::{
    WorkflowFacade,
    config::WorkflowConfig,
    directory::{InMemoryDirectory, Player},
    logging::init_logging,
    policy::Actor,
    query::TransferQuery,
    transfer::TransferSubmission,
};

fn main() -> anyhow::Result<()> {
    let mut config = match env::args().nth(1) {
        Some(path) => WorkflowConfig::load(path)?,
        None => WorkflowConfig::default(),
    };
    config.storage.temporary = true;
    init_logging(&config.logging);

    let directory = Arc::new(InMemoryDirectory::new());
    for club in ["club_a", "club_b"] {
        directory.add_club(club);
    }
    directory.add_player(Player::new("player_p", "P. Example"));

    let facade = WorkflowFacade::open(&config, directory)?;
    facade.register_player("player_p", "club_a")?;

    let club_admin = Actor::club_admin("admin_a", "club_a");
    let national_admin = Actor::national_admin("national");
    let federation = Actor::federation_reviewer("federation");

    // a second request while the first is pending is refused
    let submission = TransferSubmission::new("player_p", "club_b").set_fee(25_000);
    let transfer = facade.submit_transfer(&club_admin, &submission)?;
    if let Err(err) = facade.submit_transfer(&club_admin, &submission) {
        println!("second request refused: {} ({})", err, err.code());
    }

    facade.reject_transfer(&national_admin, &transfer.id, "incomplete paperwork")?;
    let appeal = facade.create_appeal(&club_admin, &transfer.id, "paperwork supplied", None)?;

    let escalated = facade.uphold_appeal(&national_admin, &appeal.id, "needs federation sign-off", true)?;
    println!("appeal {} is {}", appeal.id, escalated.appeal.status.as_str());

    let decision = facade.federation_review(&federation, &appeal.id, true, "approved")?;
    println!(
        "appeal {} is {}, transfer {} is {}",
        decision.appeal.id,
        decision.appeal.status.as_str(),
        decision.transfer.id,
        decision.transfer.status.as_str()
    );

    for record in facade.registration_history("player_p")? {
        println!(
            "{} at {} since {} ({:?})",
            record.player_id, record.club_id, record.registration_date, record.status
        );
    }

    let all = facade.list_transfers(&TransferQuery::new().player("player_p"))?;
    println!("{} transfer(s) on file", all.len());

    Ok(())
}

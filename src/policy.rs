//! Capability checks for every mutating workflow call.
//!
//! The policy is a pure function of the actor and the target. It reads no
//! storage and writes nothing, so managers call it before touching state.
use crate::error::{WorkflowError, WorkflowResult};
use crate::types::{ClubId, UserId};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    ClubAdmin,
    NationalAdmin,
    FederationReviewer,
    Superuser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Action {
    CreateTransfer,
    CancelTransfer,
    ApproveTransfer,
    RejectTransfer,
    CreateAppeal,
    WithdrawAppeal,
    UpholdAppeal,
    DismissAppeal,
    FederationReview,
}

impl Action {
    pub const ALL: [Action; 9] = [
        Action::CreateTransfer,
        Action::CancelTransfer,
        Action::ApproveTransfer,
        Action::RejectTransfer,
        Action::CreateAppeal,
        Action::WithdrawAppeal,
        Action::UpholdAppeal,
        Action::DismissAppeal,
        Action::FederationReview,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CreateTransfer => "create transfer",
            Action::CancelTransfer => "cancel transfer",
            Action::ApproveTransfer => "approve transfer",
            Action::RejectTransfer => "reject transfer",
            Action::CreateAppeal => "create appeal",
            Action::WithdrawAppeal => "withdraw appeal",
            Action::UpholdAppeal => "uphold appeal",
            Action::DismissAppeal => "dismiss appeal",
            Action::FederationReview => "review appeal at federation level",
        }
    }
}

/// Whoever is calling into the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
    pub club: Option<ClubId>, // set for club administrators only
}

impl Actor {
    pub fn club_admin(id: impl Into<UserId>, club: impl Into<ClubId>) -> Self {
        Self {
            id: id.into(),
            role: Role::ClubAdmin,
            club: Some(club.into()),
        }
    }
    pub fn national_admin(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            role: Role::NationalAdmin,
            club: None,
        }
    }
    pub fn federation_reviewer(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            role: Role::FederationReviewer,
            club: None,
        }
    }
    pub fn superuser(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            role: Role::Superuser,
            club: None,
        }
    }

    fn administers(&self, club: &str) -> bool {
        self.club.as_deref() == Some(club)
    }
}

/// The entity an action is aimed at, reduced to what the policy reads.
#[derive(Debug, Clone, Copy)]
pub struct Target<'a> {
    /// The player's releasing club (`from_club` of the transfer).
    pub club: &'a str,
    /// Original submitter of the transfer or appeal, if one exists yet.
    pub submitted_by: Option<&'a str>,
}

impl<'a> Target<'a> {
    pub fn club(club: &'a str) -> Self {
        Self {
            club,
            submitted_by: None,
        }
    }
    pub fn submission(club: &'a str, submitted_by: &'a str) -> Self {
        Self {
            club,
            submitted_by: Some(submitted_by),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorizationPolicy;

impl AuthorizationPolicy {
    pub fn new() -> Self {
        Self
    }

    pub fn allows(&self, actor: &Actor, action: Action, target: &Target<'_>) -> bool {
        let is_submitter = target.submitted_by == Some(actor.id.as_str());

        match (actor.role, action) {
            // withdrawal belongs to the submitter alone, whatever the role
            (Role::ClubAdmin, Action::WithdrawAppeal) => {
                is_submitter && actor.administers(target.club)
            }
            (_, Action::WithdrawAppeal) => is_submitter,

            (Role::Superuser, _) => true,

            (Role::ClubAdmin, Action::CreateTransfer | Action::CreateAppeal) => {
                actor.administers(target.club)
            }
            (Role::ClubAdmin, Action::CancelTransfer) => {
                is_submitter && actor.administers(target.club)
            }
            (Role::ClubAdmin, _) => false,

            (
                Role::NationalAdmin,
                Action::ApproveTransfer
                | Action::RejectTransfer
                | Action::CancelTransfer
                | Action::UpholdAppeal
                | Action::DismissAppeal,
            ) => true,
            (Role::NationalAdmin, _) => false,

            (Role::FederationReviewer, Action::FederationReview) => true,
            (Role::FederationReviewer, _) => false,
        }
    }

    pub fn allowed_actions(&self, actor: &Actor, target: &Target<'_>) -> BTreeSet<Action> {
        Action::ALL
            .into_iter()
            .filter(|action| self.allows(actor, *action, target))
            .collect()
    }

    pub fn check(&self, actor: &Actor, action: Action, target: &Target<'_>) -> WorkflowResult<()> {
        if self.allows(actor, action, target) {
            return Ok(());
        }

        Err(WorkflowError::PermissionDenied {
            actor: actor.id.clone(),
            action: action.as_str(),
        })
    }
}

use crate::types::{ClubId, PlayerId};

/// Failures reported by the transfer and appeal workflow.
///
/// Business-rule variants are raised before any write becomes visible. The
/// infrastructure variants at the bottom abort the enclosing transaction.
#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("Player {0} is suspended or inactive")]
    PlayerNotEligible(PlayerId),
    #[error("Player {0} has no active registration")]
    NoActiveRegistration(PlayerId),
    #[error("Transfer destination {0} is the player's current club")]
    SameClubTransfer(ClubId),
    #[error("Player {player} already has pending transfer {transfer_id}")]
    DuplicatePendingTransfer { player: PlayerId, transfer_id: String },
    #[error("Invalid state transition: {entity} is {from}, cannot {action}")]
    InvalidStateTransition {
        entity: String,
        from: &'static str,
        action: &'static str,
    },
    #[error("Transfer {transfer_id} is {status}; only rejected transfers can be appealed")]
    AppealNotAllowed {
        transfer_id: String,
        status: &'static str,
    },
    #[error("Transfer {transfer_id} already has appeal {appeal_id}")]
    DuplicateAppeal {
        transfer_id: String,
        appeal_id: String,
    },
    #[error("Permission denied: {actor} may not {action}")]
    PermissionDenied { actor: String, action: &'static str },
    #[error("Stale ledger state for {player}: expected active club {expected}, found {found:?}")]
    StaleLedgerState {
        player: PlayerId,
        expected: ClubId,
        found: Option<ClubId>,
    },

    #[error("Transfer not found: {0}")]
    TransferNotFound(String),
    #[error("Appeal not found: {0}")]
    AppealNotFound(String),
    #[error("Player not found: {0}")]
    PlayerNotFound(PlayerId),
    #[error("Club is not on the roster: {0}")]
    UnknownClub(ClubId),
    #[error("Player {0} already has an active registration")]
    DuplicateActiveRegistration(PlayerId),

    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("Record encoding error: {0}")]
    Codec(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl WorkflowError {
    /// Stable code for callers that map errors onto their own responses
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::PlayerNotEligible(_) => "PLAYER_NOT_ELIGIBLE",
            WorkflowError::NoActiveRegistration(_) => "NO_ACTIVE_REGISTRATION",
            WorkflowError::SameClubTransfer(_) => "SAME_CLUB_TRANSFER",
            WorkflowError::DuplicatePendingTransfer { .. } => "DUPLICATE_PENDING_TRANSFER",
            WorkflowError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            WorkflowError::AppealNotAllowed { .. } => "APPEAL_NOT_ALLOWED",
            WorkflowError::DuplicateAppeal { .. } => "DUPLICATE_APPEAL",
            WorkflowError::PermissionDenied { .. } => "PERMISSION_DENIED",
            WorkflowError::StaleLedgerState { .. } => "STALE_LEDGER_STATE",
            WorkflowError::TransferNotFound(_) => "TRANSFER_NOT_FOUND",
            WorkflowError::AppealNotFound(_) => "APPEAL_NOT_FOUND",
            WorkflowError::PlayerNotFound(_) => "PLAYER_NOT_FOUND",
            WorkflowError::UnknownClub(_) => "UNKNOWN_CLUB",
            WorkflowError::DuplicateActiveRegistration(_) => "DUPLICATE_ACTIVE_REGISTRATION",
            WorkflowError::Storage(_) => "STORAGE_ERROR",
            WorkflowError::Codec(_) => "CODEC_ERROR",
            WorkflowError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// The caller may re-review after re-reading the ledger.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, WorkflowError::StaleLedgerState { .. })
    }

    /// True for rule violations, false for storage and encoding failures.
    pub fn is_business_rule(&self) -> bool {
        !matches!(
            self,
            WorkflowError::Storage(_) | WorkflowError::Codec(_) | WorkflowError::Internal(_)
        )
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

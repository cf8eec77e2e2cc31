//! Player transfer and appeal workflow.
//!
//! [`facade::WorkflowFacade`] is the entry point: it runs every decision as
//! one sled transaction over the registration ledger, the transfer and appeal
//! records and the outbox, then hands staged events to the gateways.

pub mod appeal;
pub mod config;
pub mod directory;
pub mod error;
pub mod events;
pub mod facade;
pub mod logging;
pub mod policy;
pub mod query;
pub mod registration;
pub mod store;
pub mod transfer;
pub mod types;
pub mod utils;

pub use error::{WorkflowError, WorkflowResult};
pub use facade::WorkflowFacade;

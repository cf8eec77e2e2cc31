//! sled-backed storage for the workflow.
//!
//! Every mutating operation runs inside [`Store::atomically`], a single sled
//! transaction spanning the registration, transfer, appeal, index and outbox
//! trees. sled transactions are optimistic: when two callers race on the same
//! keys one closure is re-run against the committed state, which is where
//! duplicate-pending, stale-ledger and double-approval races surface as errors.
use crate::config::StorageConfig;
use crate::error::{WorkflowError, WorkflowResult};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use sled::{Db, Transactional, Tree};
use std::sync::Arc;
use tracing::error;

pub type TxResult<T> = ConflictableTransactionResult<T, WorkflowError>;

const REGISTRATIONS: &str = "registrations";
const TRANSFERS: &str = "transfers";
const APPEALS: &str = "appeals";
const INDEX: &str = "index";
const OUTBOX: &str = "outbox";
const UNDELIVERED: &str = "undelivered";

pub struct Store {
    instance: Arc<Db>,
    pub(crate) registrations: Tree,
    pub(crate) transfers: Tree,
    pub(crate) appeals: Tree,
    pub(crate) index: Tree,
    pub(crate) outbox: Tree,
    pub(crate) undelivered: Tree,
    flush_on_commit: bool,
}

/// The trees as seen from inside one transaction attempt.
pub struct Tx<'a> {
    pub(crate) registrations: &'a TransactionalTree,
    pub(crate) transfers: &'a TransactionalTree,
    pub(crate) appeals: &'a TransactionalTree,
    pub(crate) index: &'a TransactionalTree,
    pub(crate) outbox: &'a TransactionalTree,
}

impl Store {
    pub fn new(instance: Arc<Db>) -> WorkflowResult<Self> {
        Ok(Self {
            registrations: instance.open_tree(REGISTRATIONS)?,
            transfers: instance.open_tree(TRANSFERS)?,
            appeals: instance.open_tree(APPEALS)?,
            index: instance.open_tree(INDEX)?,
            outbox: instance.open_tree(OUTBOX)?,
            undelivered: instance.open_tree(UNDELIVERED)?,
            instance,
            flush_on_commit: false,
        })
    }

    pub fn open(config: &StorageConfig) -> WorkflowResult<Self> {
        let db = sled::Config::new()
            .path(&config.path)
            .temporary(config.temporary)
            .open()?;

        Ok(Self::new(Arc::new(db))?.with_flush_on_commit(config.flush_on_commit))
    }

    pub fn with_flush_on_commit(mut self, flush_on_commit: bool) -> Self {
        self.flush_on_commit = flush_on_commit;
        self
    }

    /// Run `f` as one atomic unit. An `Abort` from `f`, or a storage failure,
    /// leaves every tree exactly as it was before the call.
    ///
    /// `f` may run more than once under contention, so it must not have side
    /// effects outside the trees it is handed.
    pub fn atomically<T, F>(&self, f: F) -> WorkflowResult<T>
    where
        F: Fn(&Tx<'_>) -> TxResult<T>,
    {
        let outcome = (
            &self.registrations,
            &self.transfers,
            &self.appeals,
            &self.index,
            &self.outbox,
        )
            .transaction(|(registrations, transfers, appeals, index, outbox)| {
                f(&Tx {
                    registrations,
                    transfers,
                    appeals,
                    index,
                    outbox,
                })
            });

        let value = match outcome {
            Ok(value) => value,
            Err(TransactionError::Abort(err)) => return Err(err),
            Err(TransactionError::Storage(err)) => return Err(err.into()),
        };

        // the transaction is committed from here on; a failed flush must not
        // be reported as a rollback
        if self.flush_on_commit {
            if let Err(err) = self.instance.flush() {
                error!(error = %err, "flush after commit failed");
            }
        }

        Ok(value)
    }

    /// Committed read outside any transaction
    pub(crate) fn get<T>(&self, tree: &Tree, key: &str) -> WorkflowResult<Option<T>>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        match tree.get(key.as_bytes())? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    pub(crate) fn scan<T>(&self, tree: &Tree, prefix: &str) -> WorkflowResult<Vec<T>>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        let mut values = vec![];
        for entry in tree.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = entry?;
            values.push(decode(&bytes)?);
        }
        Ok(values)
    }
}

// index keys
pub(crate) fn active_key(player_id: &str) -> String {
    format!("active/{player_id}")
}
pub(crate) fn pending_key(player_id: &str) -> String {
    format!("pending/{player_id}")
}
pub(crate) fn appeal_key(transfer_id: &str) -> String {
    format!("appeal/{transfer_id}")
}

pub(crate) fn encode<T: minicbor::Encode<()>>(value: &T) -> WorkflowResult<Vec<u8>> {
    minicbor::to_vec(value).map_err(|e| WorkflowError::Codec(e.to_string()))
}

pub(crate) fn decode<T>(bytes: &[u8]) -> WorkflowResult<T>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    minicbor::decode(bytes).map_err(|e| WorkflowError::Codec(e.to_string()))
}

pub(crate) fn abort<T>(err: WorkflowError) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(err))
}

/// Lift a plain workflow result into a transaction result.
pub(crate) fn guard<T>(result: WorkflowResult<T>) -> TxResult<T> {
    result.map_err(ConflictableTransactionError::Abort)
}

pub(crate) fn read<T>(tree: &TransactionalTree, key: &str) -> TxResult<Option<T>>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    match tree.get(key.as_bytes())? {
        Some(bytes) => guard(decode(&bytes)).map(Some),
        None => Ok(None),
    }
}

pub(crate) fn write<T: minicbor::Encode<()>>(
    tree: &TransactionalTree,
    key: &str,
    value: &T,
) -> TxResult<()> {
    let bytes = guard(encode(value))?;
    tree.insert(key.as_bytes(), bytes)?;
    Ok(())
}

pub(crate) fn remove(tree: &TransactionalTree, key: &str) -> TxResult<()> {
    tree.remove(key.as_bytes())?;
    Ok(())
}

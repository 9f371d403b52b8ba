use parking_lot::Mutex;
use std::fmt;

use crate::driver::{Session, SessionId};
use crate::errors::DbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxState {
    NoTransaction,
    Active,
    Committed,
    RolledBack,
}

impl TxState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoTransaction => "no transaction",
            Self::Active => "active",
            Self::Committed => "committed",
            Self::RolledBack => "rolled back",
        })
    }
}

struct Inner {
    state: TxState,
    session: Box<dyn Session>,
}

/// A driver session with an open transaction. Shared by every builder derived
/// from the one that began it.
pub struct Transaction {
    id: SessionId,
    inner: Mutex<Inner>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction").field("id", &self.id).field("state", &self.state()).finish()
    }
}

impl Transaction {
    /// Starts a transaction on `session`.
    pub(crate) fn start(mut session: Box<dyn Session>) -> Result<Self, DbError> {
        session.start_transaction()?;
        let id = session.id();
        log::debug!("transaction started on session {id}");
        Ok(Self { id, inner: Mutex::new(Inner { state: TxState::Active, session }) })
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> TxState {
        self.inner.lock().state
    }

    /// Session id for an operation; fails once the transaction is closed.
    pub(crate) fn operation_session(&self) -> Result<SessionId, DbError> {
        match self.state() {
            TxState::Active => Ok(self.id),
            TxState::NoTransaction => Err(DbError::NoActiveTransaction),
            closed => Err(DbError::TransactionClosed(closed)),
        }
    }

    /// Active → Committed. On driver failure the state stays Active.
    pub(crate) fn commit(&self) -> Result<(), DbError> {
        let mut inner = self.inner.lock();
        match inner.state {
            TxState::Active => {
                inner.session.commit_transaction()?;
                inner.state = TxState::Committed;
                inner.session.end_session();
                log::debug!("transaction {} committed", self.id);
                Ok(())
            }
            TxState::NoTransaction => Err(DbError::NoActiveTransaction),
            closed => Err(DbError::TransactionClosed(closed)),
        }
    }

    /// Active → RolledBack.
    pub(crate) fn rollback(&self) -> Result<(), DbError> {
        let mut inner = self.inner.lock();
        match inner.state {
            TxState::Active => {
                inner.session.abort_transaction()?;
                inner.state = TxState::RolledBack;
                inner.session.end_session();
                log::debug!("transaction {} rolled back", self.id);
                Ok(())
            }
            TxState::NoTransaction => Err(DbError::NoActiveTransaction),
            closed => Err(DbError::TransactionClosed(closed)),
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if inner.state == TxState::Active {
            log::warn!("transaction {} dropped while active; aborting", self.id);
            if let Err(e) = inner.session.abort_transaction() {
                log::warn!("abort of dropped transaction {} failed: {e}", self.id);
            }
            inner.session.end_session();
        }
    }
}

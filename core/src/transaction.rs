//! Transaction guard.

use crate::driver::Driver;
use crate::error::{JoineryError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

/// An open transaction; dropping it unfinished rolls back.
///
/// ```ignore
/// let mut tx = Transaction::begin(&db)?;
/// user.save(tx.driver())?;
/// tx.commit()?;
/// ```
pub struct Transaction<'a> {
    db: &'a dyn Driver,
    state: TransactionState,
}

impl<'a> Transaction<'a> {
    pub fn begin(db: &'a dyn Driver) -> Result<Self> {
        db.begin()?;
        Ok(Self {
            db,
            state: TransactionState::Active,
        })
    }

    /// The connection the transaction runs on
    #[inline]
    #[must_use]
    pub fn driver(&self) -> &'a dyn Driver {
        self.db
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn commit(&mut self) -> Result<()> {
        match self.state {
            TransactionState::Active => {
                // a failed COMMIT leaves nothing to roll back
                self.state = TransactionState::Committed;
                self.db.commit()
            }
            state => Err(JoineryError::Transaction(format!(
                "cannot commit a transaction that is {state:?}"
            ))),
        }
    }

    /// Rolls back; a no-op once the transaction has finished.
    pub fn rollback(&mut self) -> Result<()> {
        if self.state != TransactionState::Active {
            return Ok(());
        }
        self.state = TransactionState::RolledBack;
        self.db.rollback()
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.state != TransactionState::Active {
            return;
        }
        self.state = TransactionState::RolledBack;
        if let Err(_e) = self.db.rollback() {
            #[cfg(feature = "tracing")]
            ::tracing::warn!(error = %_e, "joinery.transaction rollback on drop failed");
        }
    }
}

/// Runs `f` inside a transaction: commits on `Ok`, rolls back on `Err`.
pub fn transaction<T>(db: &dyn Driver, f: impl FnOnce(&dyn Driver) -> Result<T>) -> Result<T> {
    let mut tx = Transaction::begin(db)?;
    match f(tx.driver()) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(e) => Err(e.with_cleanup(tx.rollback())),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::dialect::{SqlDialect, StandardDialect};
    use crate::driver::{BufferedRows, RowSource};
    use crate::value::Value;

    #[derive(Default)]
    struct Log(RefCell<Vec<String>>);

    impl Driver for Log {
        fn name(&self) -> &'static str {
            "log"
        }

        fn dialect(&self) -> &dyn SqlDialect {
            &StandardDialect
        }

        fn execute(&self, sql: &str, _: &[Value]) -> Result<u64> {
            self.0.borrow_mut().push(sql.to_owned());
            Ok(0)
        }

        fn query<'a>(&'a self, _: &str, _: &[Value]) -> Result<Box<dyn RowSource + 'a>> {
            Ok(Box::new(BufferedRows::default()))
        }
    }

    #[test]
    fn drop_rolls_back() {
        let db = Log::default();
        {
            let _tx = Transaction::begin(&db).unwrap();
        }
        assert_eq!(*db.0.borrow(), vec!["BEGIN", "ROLLBACK"]);
    }

    #[test]
    fn rollback_after_commit_is_a_no_op() {
        let db = Log::default();
        let mut tx = Transaction::begin(&db).unwrap();
        tx.commit().unwrap();
        tx.rollback().unwrap();
        assert!(tx.commit().is_err());
        drop(tx);
        assert_eq!(*db.0.borrow(), vec!["BEGIN", "COMMIT"]);
    }

    #[test]
    fn closure_error_rolls_back() {
        let db = Log::default();
        let result: Result<()> = transaction(&db, |_| Err(JoineryError::Record("no".into())));
        assert!(result.is_err());
        assert_eq!(*db.0.borrow(), vec!["BEGIN", "ROLLBACK"]);
    }
}

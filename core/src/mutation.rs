//! Saving and deleting records under optimistic locking.
//!
//! A table with a lock column carries a version on every row. Updates and
//! deletes are guarded by `WHERE pk = ? AND lock = <loaded version>`; a
//! guarded write that touches no row means another writer got there first,
//! and surfaces as [`JoineryError::OptimisticLock`]. Successful updates move
//! the version on through the driver's [`VersionStrategy`](crate::version::VersionStrategy).

use std::sync::Arc;

use joinery_types::ReceiverType;
use uuid::Uuid;

use crate::driver::Driver;
use crate::error::{JoineryError, Result};
use crate::record::{Record, RecordState, Relation};
use crate::schema::{ColumnMeta, TableMeta};
use crate::sql::write::{self, Field};
use crate::value::{Value, new_ulid};

impl Record {
    /// Writes this record and every loaded or assigned relation.
    ///
    /// Order: forward references first (their keys become this record's
    /// foreign keys), then this record, then reverse children and many-many
    /// targets (which need this record's key). Wrap the call in a
    /// [`Transaction`](crate::transaction::Transaction) to make the cascade
    /// atomic.
    pub fn save(&mut self, db: &dyn Driver) -> Result<()> {
        let table = self.table.clone();

        for reference in &table.references {
            let Some(slot) = self.relations.get_mut(&reference.identifier) else {
                continue;
            };
            let key = match &mut slot.relation {
                Relation::One(Some(target)) => {
                    target.save(db)?;
                    Some(target.key().clone())
                }
                Relation::One(None) if slot.modified => Some(Value::Null),
                _ => None,
            };
            let modified = std::mem::take(&mut slot.modified);
            if let Some(key) = key {
                self.relink(&reference.column, key, modified);
            }
        }

        match self.state {
            RecordState::New => self.insert(db)?,
            RecordState::Saved if self.is_dirty() => self.update(db)?,
            RecordState::Saved => {}
        }

        let key = self.key().clone();
        for reverse in &table.reverse {
            let Some(slot) = self.relations.get_mut(&reverse.identifier) else {
                continue;
            };
            let modified = slot.modified;
            for child in slot.records_mut() {
                child.relink(&reverse.column, key.clone(), modified);
                child.save(db)?;
            }
            slot.modified = false;
        }

        for relation in &table.many_many {
            let Some(slot) = self.relations.get_mut(&relation.identifier) else {
                continue;
            };
            let mut targets = Vec::new();
            for target in slot.records_mut() {
                target.save(db)?;
                targets.push(target.key().clone());
            }
            if slot.modified {
                let dialect = db.dialect();
                let statement = write::unlink_all(relation, &key).render(dialect);
                db.execute(&statement.sql, &statement.args)?;
                for target in &targets {
                    let statement = write::link(relation, &key, target).render(dialect);
                    db.execute(&statement.sql, &statement.args)?;
                }
            }
            slot.modified = false;
        }
        Ok(())
    }

    /// Deletes this record's row, guarded by its version on locking tables.
    pub fn delete(self, db: &dyn Driver) -> Result<()> {
        let table = self.table.clone();
        let guard = self.guard()?;
        let statement = write::delete(&table, &guard).render(db.dialect());
        let affected = db.execute(&statement.sql, &statement.args)?;
        if affected == 0 {
            return Err(self.lost(&table));
        }
        Ok(())
    }

    /// Points a foreign key at `key`. A saved record loaded through a
    /// relation without its key column keeps the column unloaded, so an
    /// untouched relation never turns into a write.
    fn relink(&mut self, column: &str, key: Value, modified: bool) {
        if modified || self.is_new() || self.values.contains_key(column) {
            self.assign(column, key);
        }
    }

    fn insert(&mut self, db: &dyn Driver) -> Result<()> {
        let table = self.table.clone();
        let key = table.primary_key();

        if self.key().is_null() {
            match key.receiver {
                ReceiverType::Uuid => self.assign(&key.name, Value::Uuid(Uuid::new_v4())),
                ReceiverType::Ulid => self.assign(&key.name, Value::Text(new_ulid())),
                _ => {}
            }
        }
        if let Some(lock) = table.lock_column() {
            let version = db.version_strategy().next(None);
            self.values.insert(lock.name.clone(), Value::Int(version));
        }

        let fields: Vec<Field<'_>> = table
            .columns
            .iter()
            .filter_map(|column| {
                let value = self.values.get(&column.name)?;
                (!(column.primary_key && value.is_null())).then(|| (column, value.clone()))
            })
            .collect();
        let assigned = db.insert(&table, &fields)?;

        if self.key().is_null() {
            let assigned = assigned.ok_or_else(|| {
                JoineryError::Record(format!("database assigned no key to new {}", table.name))
            })?;
            self.values.insert(key.name.clone(), assigned);
        }
        self.state = RecordState::Saved;
        self.dirty.clear();
        Ok(())
    }

    fn update(&mut self, db: &dyn Driver) -> Result<()> {
        let table = self.table.clone();
        let guard = self.guard()?;

        let mut set: Vec<Field<'_>> = table
            .columns
            .iter()
            .filter(|c| !c.primary_key && !c.is_lock() && self.dirty.contains(&c.name))
            .map(|c| (c, self.values.get(&c.name).cloned().unwrap_or_default()))
            .collect();
        if set.is_empty() {
            self.dirty.clear();
            return Ok(());
        }
        let next = match table.lock_column() {
            Some(lock) => {
                let previous = self.version(lock)?;
                let next = db.version_strategy().next(Some(previous));
                set.push((lock, Value::Int(next)));
                Some((lock, next))
            }
            None => None,
        };

        let statement = write::update(&table, &set, &guard).render(db.dialect());
        let affected = db.execute(&statement.sql, &statement.args)?;
        if affected == 0 {
            return Err(self.lost(&table));
        }
        if let Some((lock, next)) = next {
            self.values.insert(lock.name.clone(), Value::Int(next));
        }
        self.dirty.clear();
        Ok(())
    }

    /// `pk = key`, plus `lock = loaded version` on locking tables.
    fn guard(&self) -> Result<Vec<Field<'_>>> {
        let table = &self.table;
        let key = self.key();
        if key.is_null() {
            return Err(JoineryError::Record(format!(
                "{} has no primary key value",
                table.name
            )));
        }
        let mut guard = vec![(table.primary_key(), key.clone())];
        if let Some(lock) = table.lock_column() {
            guard.push((lock, Value::Int(self.version(lock)?)));
        }
        Ok(guard)
    }

    fn version(&self, lock: &ColumnMeta) -> Result<i64> {
        self.values
            .get(&lock.name)
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                JoineryError::Record(format!(
                    "{}.{} was not loaded; it is needed to guard the write",
                    self.table.name, lock.name
                ))
            })
    }

    /// Error for a guarded write that matched no row.
    fn lost(&self, table: &Arc<TableMeta>) -> JoineryError {
        let key = self.key().to_string();
        if table.lock_column().is_some() {
            crate::joinery_trace_conflict!(table.name, key);
            JoineryError::OptimisticLock {
                table: table.name.clone(),
                key,
            }
        } else {
            JoineryError::RecordNotFound(format!("{} {key}", table.name))
        }
    }
}

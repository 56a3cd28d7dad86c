//! Generic entity mapper.
//!
//! One `Mapper<E>` instance serves one entity kind, configured by an
//! `EntityKind` value: table name, name column, writable columns, row/value
//! conversion functions and the identity resolver used by
//! `insert_or_update`. Entity kinds plug in configuration instead of
//! overriding a base class.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, types::Value, Connection};
use tracing::debug;

use super::error::{StoreError, StoreResult};
use super::models::SortMode;

pub trait Entity {
    fn id(&self) -> Option<i64>;
    fn set_id(&mut self, id: i64);
    fn user_id(&self) -> &str;
}

/// Per-kind configuration for the generic mapper.
pub struct EntityKind<E> {
    /// Lowercase singular label used in error messages.
    pub entity: &'static str,
    pub table: &'static str,
    /// Column used by name lookups and default name sorting.
    pub name_column: &'static str,
    /// Columns written on insert and update, in `to_values` order. `id` is
    /// never written; `starred` and the album cover are excluded because
    /// they change only through their dedicated operations.
    pub columns: &'static [&'static str],
    pub from_row: fn(&rusqlite::Row<'_>) -> rusqlite::Result<E>,
    pub to_values: fn(&E) -> Vec<Value>,
    /// Locates the id of the existing row that shares the entity's logical
    /// identity. `Ok(None)` when no such row exists.
    pub identity: fn(&Connection, &E) -> StoreResult<Option<i64>>,
}

pub struct Mapper<E: Entity + 'static> {
    conn: Arc<Mutex<Connection>>,
    kind: &'static EntityKind<E>,
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn append_limit_offset(sql: &mut String, values: &mut Vec<Value>, limit: Option<i64>, offset: Option<i64>) {
    if limit.is_none() && offset.is_none() {
        return;
    }
    // LIMIT -1 means unbounded, which OFFSET needs when no limit was given
    sql.push_str(" LIMIT ?");
    values.push(Value::from(limit.unwrap_or(-1)));
    if let Some(offset) = offset {
        sql.push_str(" OFFSET ?");
        values.push(Value::from(offset));
    }
}

impl<E: Entity> Mapper<E> {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>, kind: &'static EntityKind<E>) -> Self {
        Mapper { conn, kind }
    }

    fn select_sql(&self) -> String {
        format!("SELECT * FROM {}", self.kind.table)
    }

    fn expect_unique(&self, mut rows: Vec<E>, key: String) -> StoreResult<E> {
        match rows.len() {
            0 => Err(StoreError::NotFound {
                entity: self.kind.entity,
                key,
            }),
            1 => Ok(rows.remove(0)),
            count => Err(StoreError::Ambiguous {
                entity: self.kind.entity,
                key,
                count,
            }),
        }
    }

    /// Exact lookup scoped to the owning user.
    ///
    /// More than one match is structurally impossible given primary-key
    /// uniqueness, but is guarded anyway to catch schema bugs early.
    pub fn find(&self, id: i64, user_id: &str) -> StoreResult<E> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare(&format!("{} WHERE id = ?1 AND user_id = ?2", self.select_sql()))?;
        let rows = stmt
            .query_map(params![id, user_id], self.kind.from_row)?
            .collect::<rusqlite::Result<Vec<E>>>()?;
        self.expect_unique(rows, format!("id {}", id))
    }

    /// Batch lookup by id list. Passing `None` for `user_id` skips the
    /// ownership filter; that path is for trusted maintenance callers, not
    /// a public boundary.
    pub fn find_by_ids(&self, ids: &[i64], user_id: Option<&str>) -> StoreResult<Vec<E>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().unwrap();
        let mut sql = format!("{} WHERE id IN ({})", self.select_sql(), placeholders(ids.len()));
        let mut values: Vec<Value> = ids.iter().map(|id| Value::from(*id)).collect();
        if let Some(user_id) = user_id {
            sql.push_str(" AND user_id = ?");
            values.push(Value::from(user_id.to_string()));
        }
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), self.kind.from_row)?
            .collect::<rusqlite::Result<Vec<E>>>()?;
        Ok(rows)
    }

    pub fn find_all(
        &self,
        user_id: &str,
        sort: SortMode,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> StoreResult<Vec<E>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = format!("{} WHERE user_id = ?", self.select_sql());
        match sort {
            SortMode::None => {}
            SortMode::Name => {
                sql.push_str(&format!(" ORDER BY {} COLLATE NOCASE", self.kind.name_column))
            }
            SortMode::Newest => sql.push_str(" ORDER BY id DESC"),
        }
        let mut values = vec![Value::from(user_id.to_string())];
        append_limit_offset(&mut sql, &mut values, limit, offset);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), self.kind.from_row)?
            .collect::<rusqlite::Result<Vec<E>>>()?;
        Ok(rows)
    }

    /// Name lookup. `None` matches rows whose name column is null, not "no
    /// filter". Fuzzy is a case-insensitive substring match; exact is plain
    /// equality. Results are always name-sorted case-insensitively.
    pub fn find_all_by_name(
        &self,
        name: Option<&str>,
        user_id: &str,
        fuzzy: bool,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> StoreResult<Vec<E>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = format!("{} WHERE user_id = ?", self.select_sql());
        let mut values = vec![Value::from(user_id.to_string())];
        match name {
            None => sql.push_str(&format!(" AND {} IS NULL", self.kind.name_column)),
            Some(name) if fuzzy => {
                sql.push_str(&format!(" AND lower({}) LIKE ?", self.kind.name_column));
                values.push(Value::from(format!("%{}%", name.to_lowercase())));
            }
            Some(name) => {
                sql.push_str(&format!(" AND {} = ?", self.kind.name_column));
                values.push(Value::from(name.to_string()));
            }
        }
        sql.push_str(&format!(" ORDER BY {} COLLATE NOCASE", self.kind.name_column));
        append_limit_offset(&mut sql, &mut values, limit, offset);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), self.kind.from_row)?
            .collect::<rusqlite::Result<Vec<E>>>()?;
        Ok(rows)
    }

    pub fn find_all_starred(
        &self,
        user_id: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> StoreResult<Vec<E>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = format!(
            "{} WHERE user_id = ? AND starred IS NOT NULL ORDER BY {} COLLATE NOCASE",
            self.select_sql(),
            self.kind.name_column
        );
        let mut values = vec![Value::from(user_id.to_string())];
        append_limit_offset(&mut sql, &mut values, limit, offset);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), self.kind.from_row)?
            .collect::<rusqlite::Result<Vec<E>>>()?;
        Ok(rows)
    }

    /// Bulk set or clear the starred marker. Returns the number of rows
    /// actually modified; ids not owned by `user_id` are silently excluded.
    pub fn set_starred_date(
        &self,
        date: Option<DateTime<Utc>>,
        ids: &[i64],
        user_id: &str,
    ) -> StoreResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "UPDATE {} SET starred = ? WHERE user_id = ? AND id IN ({})",
            self.kind.table,
            placeholders(ids.len())
        );
        let mut values: Vec<Value> = vec![
            Value::from(date.map(|d| d.to_rfc3339())),
            Value::from(user_id.to_string()),
        ];
        values.extend(ids.iter().map(|id| Value::from(*id)));
        Ok(conn.execute(&sql, params_from_iter(values))?)
    }

    pub fn count(&self, user_id: &str) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE user_id = ?1", self.kind.table),
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// No-op on empty input: a vacuous `IN ()` is invalid SQL in some
    /// dialects.
    pub fn delete_by_ids(&self, ids: &[i64]) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "DELETE FROM {} WHERE id IN ({})",
            self.kind.table,
            placeholders(ids.len())
        );
        conn.execute(&sql, params_from_iter(ids.iter().map(|id| Value::from(*id))))?;
        Ok(())
    }

    fn insert(&self, conn: &Connection, entity: &E) -> StoreResult<i64> {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.kind.table,
            self.kind.columns.join(", "),
            placeholders(self.kind.columns.len())
        );
        conn.execute(&sql, params_from_iter((self.kind.to_values)(entity)))?;
        Ok(conn.last_insert_rowid())
    }

    fn update(&self, conn: &Connection, id: i64, entity: &E) -> StoreResult<()> {
        let assignments = self
            .kind
            .columns
            .iter()
            .map(|c| format!("{} = ?", c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("UPDATE {} SET {} WHERE id = ?", self.kind.table, assignments);
        let mut values = (self.kind.to_values)(entity);
        values.push(Value::from(id));
        conn.execute(&sql, params_from_iter(values))?;
        Ok(())
    }

    /// Insert, or update the row with the same logical identity.
    ///
    /// The insert is attempted first; a unique-constraint violation means a
    /// row with this identity exists (inserted earlier or by a concurrent
    /// writer), so the identity resolver locates it and the entity is
    /// updated in place, adopting the existing id. A pre-check would race
    /// between check and act; this shape costs at most one failed insert
    /// and never a duplicate row. Which of two concurrent writers wins the
    /// update is not defined beyond last-write-wins.
    pub fn insert_or_update(&self, entity: &mut E) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        match self.insert(&conn, entity) {
            Ok(id) => {
                entity.set_id(id);
                Ok(())
            }
            Err(StoreError::UniqueConstraint(_)) => {
                let existing_id =
                    (self.kind.identity)(&conn, entity)?.ok_or(StoreError::NotFound {
                        entity: self.kind.entity,
                        key: "identity of conflicting insert".to_string(),
                    })?;
                debug!(
                    "{} insert conflicted, updating existing row {}",
                    self.kind.entity, existing_id
                );
                entity.set_id(existing_id);
                self.update(&conn, existing_id, entity)
            }
            Err(err) => Err(err),
        }
    }
}

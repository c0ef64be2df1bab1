//! SQLite metadata store and per-plugin storage facade.
//!
//! Connections are short-lived: every operation opens and closes its own
//! connection. The one exception is [`Database::execute_transaction`], which
//! wraps a statement list in a single transaction.

use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode, ToSql, TransactionBehavior};
use std::path::{Path, PathBuf};
use tracing::{error, warn};

use crate::application::errors::StorageError;

/// Reserved token in plugin queries, substituted with `<plugin>_`.
const TABLE_PREFIX_TOKEN: char = '#';

/// One parameterized statement inside a batched transaction.
#[derive(Debug, Clone)]
pub struct BatchStatement {
    pub query: String,
    pub params: Vec<(String, String)>,
}

impl BatchStatement {
    pub fn new(query: impl Into<String>, params: &[(&str, &str)]) -> Self {
        Self {
            query: query.into(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// Handle to the host database.
///
/// Cheap to clone; each operation opens its own connection against the
/// stored path. Query failures after startup are logged and degrade to an
/// empty result or a zero row count, never a panic.
#[derive(Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Create the host bookkeeping tables. Failure here is fatal to the
    /// host; it is the only storage error that is.
    pub fn initialize(&self) -> Result<(), StorageError> {
        let conn = self.connect()?;
        create_table(
            &conn,
            "plugin_properties",
            "module_name TEXT PRIMARY KEY, plugin_name TEXT",
        )?;
        create_table(&conn, "guildsettings", "guild_id TEXT PRIMARY KEY, prefix TEXT")?;
        create_table(
            &conn,
            "command_info",
            "command_name TEXT PRIMARY KEY, plugin_name TEXT, module_name TEXT",
        )?;
        create_table(
            &conn,
            "modal_info",
            "modal_name TEXT PRIMARY KEY, plugin_name TEXT, module_name TEXT",
        )?;
        create_table(
            &conn,
            "message_info",
            "message_id TEXT PRIMARY KEY, plugin_name TEXT",
        )?;
        Ok(())
    }

    fn connect(&self) -> Result<Connection, StorageError> {
        Connection::open(&self.path).map_err(|e| StorageError::Open(e.to_string()))
    }

    /// Run a select and return every row value flattened into one sequence,
    /// in row-major order. Errors are logged and yield an empty result.
    pub fn select(&self, query: &str, params: &[(&str, &str)]) -> Vec<String> {
        match self.try_select(query, params) {
            Ok(items) => items,
            Err(e) => {
                error!("Failed to read data from the database: {}", e);
                Vec::new()
            }
        }
    }

    fn try_select(&self, query: &str, params: &[(&str, &str)]) -> Result<Vec<String>, StorageError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(query)?;
        let column_count = stmt.column_count();
        let mut rows = stmt.query(&bind(params)[..])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            for i in 0..column_count {
                items.push(value_to_string(row.get_ref(i)?));
            }
        }
        Ok(items)
    }

    /// Insert rows; returns the affected-row count, zero on failure.
    pub fn insert(&self, query: &str, params: &[(&str, &str)]) -> usize {
        self.execute("Insert", query, params)
    }

    /// Update rows; returns the affected-row count, zero on failure.
    pub fn update(&self, query: &str, params: &[(&str, &str)]) -> usize {
        self.execute("Update", query, params)
    }

    /// Delete rows; returns the affected-row count, zero on failure.
    pub fn delete(&self, query: &str, params: &[(&str, &str)]) -> usize {
        self.execute("Delete", query, params)
    }

    fn execute(&self, kind: &str, query: &str, params: &[(&str, &str)]) -> usize {
        match self.try_execute(query, params) {
            Ok(affected) => affected,
            Err(e) => {
                error!("{} query failed: {}", kind, e);
                0
            }
        }
    }

    fn try_execute(&self, query: &str, params: &[(&str, &str)]) -> Result<usize, StorageError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(query)?;
        Ok(stmt.execute(&bind(params)[..])?)
    }

    /// Execute a statement list atomically.
    ///
    /// Uniqueness-constraint violations on individual statements are
    /// tolerated and skipped; any other failure rolls the whole batch back.
    /// Returns the total affected-row count of the statements that ran.
    pub fn execute_transaction(
        &self,
        statements: &[BatchStatement],
    ) -> Result<usize, StorageError> {
        let mut conn = self.connect()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| StorageError::Transaction(e.to_string()))?;

        let mut affected = 0;
        for statement in statements {
            let params: Vec<(&str, &str)> = statement
                .params
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            let result = tx
                .prepare(&statement.query)
                .and_then(|mut stmt| stmt.execute(&bind(&params)[..]));
            match result {
                Ok(count) => affected += count,
                Err(e) if is_unique_violation(&e) => {
                    warn!("Skipping statement in batch, row already exists: {}", e);
                }
                Err(e) => {
                    // Dropping the transaction without commit rolls back.
                    return Err(StorageError::Transaction(e.to_string()));
                }
            }
        }

        tx.commit()
            .map_err(|e| StorageError::Transaction(e.to_string()))?;
        Ok(affected)
    }

    /// Idempotently create a table owned by a plugin. The table name and any
    /// `#` token inside the column spec get the plugin prefix.
    pub fn create_plugin_table(
        &self,
        plugin_name: &str,
        table_name: &str,
        columns: &str,
    ) -> Result<(), StorageError> {
        let columns = prefix_query(columns, plugin_name);
        let conn = self.connect()?;
        create_table(&conn, &format!("{}_{}", plugin_name, table_name), &columns)
    }

    pub fn table_exists(&self, table_name: &str) -> bool {
        let rows = self.select(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = :name",
            &[(":name", table_name)],
        );
        !rows.is_empty()
    }

    /// Bind this database to a plugin name, enabling the `#` prefix token.
    pub fn for_plugin(&self, plugin_name: &str) -> PluginStorage {
        PluginStorage {
            db: self.clone(),
            plugin_name: plugin_name.to_string(),
        }
    }
}

/// Per-plugin storage facade handed to plugins at init time.
///
/// Identical surface to [`Database`], except any `#` token in a query is
/// replaced with the owning plugin's table prefix before execution.
#[derive(Clone)]
pub struct PluginStorage {
    db: Database,
    plugin_name: String,
}

impl PluginStorage {
    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    pub fn select(&self, query: &str, params: &[(&str, &str)]) -> Vec<String> {
        self.db.select(&self.rewrite(query), params)
    }

    pub fn insert(&self, query: &str, params: &[(&str, &str)]) -> usize {
        self.db.insert(&self.rewrite(query), params)
    }

    pub fn update(&self, query: &str, params: &[(&str, &str)]) -> usize {
        self.db.update(&self.rewrite(query), params)
    }

    pub fn delete(&self, query: &str, params: &[(&str, &str)]) -> usize {
        self.db.delete(&self.rewrite(query), params)
    }

    pub fn execute_transaction(
        &self,
        statements: &[BatchStatement],
    ) -> Result<usize, StorageError> {
        let rewritten: Vec<BatchStatement> = statements
            .iter()
            .map(|s| BatchStatement {
                query: self.rewrite(&s.query),
                params: s.params.clone(),
            })
            .collect();
        self.db.execute_transaction(&rewritten)
    }

    fn rewrite(&self, query: &str) -> String {
        prefix_query(query, &self.plugin_name)
    }
}

fn prefix_query(query: &str, plugin_name: &str) -> String {
    if query.contains(TABLE_PREFIX_TOKEN) {
        query.replace(TABLE_PREFIX_TOKEN, &format!("{}_", plugin_name))
    } else {
        query.to_string()
    }
}

fn create_table(conn: &Connection, table_name: &str, columns: &str) -> Result<(), StorageError> {
    conn.execute(
        &format!("CREATE TABLE IF NOT EXISTS {} ({})", table_name, columns),
        [],
    )?;
    Ok(())
}

fn bind<'a>(params: &'a [(&'a str, &'a str)]) -> Vec<(&'a str, &'a dyn ToSql)> {
    params.iter().map(|(k, v)| (*k, v as &dyn ToSql)).collect()
}

fn value_to_string(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(r) => r.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => String::from_utf8_lossy(b).into_owned(),
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

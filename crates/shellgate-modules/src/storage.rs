// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Storage module: named SQLite databases reachable by an integer handle.
//
// Database files live under `<data>/databases/<name>.db`. SQL failures are
// answered with a `{code,message}` payload so scripts can tell a syntax error
// from a runtime one.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use rusqlite::Connection;
use rusqlite::types::{Null, ValueRef};
use shellgate_args::{KindSet, Object, Value};
use shellgate_core::{BridgeError, CallbackStatus, Result};
use shellgate_exec::{CommandHandler, Invocation, ModuleContext, Reply};
use tracing::{debug, info, instrument, warn};

const DATABASE_ERR: i32 = 1;
const SYNTAX_ERR: i32 = 5;

const OPEN_SHAPE: [KindSet; 4] = [KindSet::STRING, KindSet::STRING, KindSet::STRING, KindSet::INT32];
const EXECUTE_SHAPE: [KindSet; 4] = [KindSet::INT32, KindSet::STRING, KindSet::ARRAY, KindSet::STRING];

/// Statements that change the schema reply without a result set.
const DDL_PREFIXES: [&str; 4] = ["create", "drop", "alter", "truncate"];

struct OpenDatabase {
    name: String,
    conn: Connection,
}

#[derive(Default)]
struct Databases {
    handles: HashMap<String, i32>,
    open: HashMap<i32, OpenDatabase>,
    last_handle: i32,
}

pub struct Storage {
    root: OnceLock<PathBuf>,
    databases: Mutex<Databases>,
}

impl Default for Storage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage {
    pub fn new() -> Self {
        Self {
            root: OnceLock::new(),
            databases: Mutex::new(Databases::default()),
        }
    }

    fn root(&self) -> Result<&PathBuf> {
        self.root
            .get()
            .ok_or_else(|| BridgeError::Bridge("storage root not initialised".into()))
    }

    fn database_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.root()?.join(format!("{name}.db")))
    }

    #[instrument(skip(self))]
    fn open_database(&self, name: &str) -> Result<i32> {
        check_name(name)?;
        let mut dbs = self.databases.lock().expect("storage lock poisoned");
        if let Some(&handle) = dbs.handles.get(name) {
            debug!(handle, "database already open");
            return Ok(handle);
        }

        let path = self.database_path(name)?;
        let conn = Connection::open(&path).map_err(|e| BridgeError::Database(format!("open {name}: {e}")))?;

        dbs.last_handle += 1;
        let handle = dbs.last_handle;
        dbs.handles.insert(name.to_string(), handle);
        dbs.open.insert(
            handle,
            OpenDatabase {
                name: name.to_string(),
                conn,
            },
        );
        info!(handle, path = %path.display(), "database opened");
        Ok(handle)
    }

    fn execute_sql(&self, handle: i32, sql: &str, params: &[Value], tx_id: &str) -> Reply {
        let dbs = self.databases.lock().expect("storage lock poisoned");
        let Some(db) = dbs.open.get(&handle) else {
            return sql_failure(DATABASE_ERR, format!("no open database with handle {handle}"));
        };

        match run_statement(&db.conn, sql, params) {
            Ok(StatementResult::Schema) => Reply::success(Object::new().with("id", tx_id).with("data", "")),
            Ok(StatementResult::Rows {
                rows,
                rows_affected,
                insert_id,
            }) => Reply::success(
                Object::new()
                    .with("id", tx_id)
                    .with("data", rows)
                    .with("rowsAffected", rows_affected)
                    .with("insertId", insert_id),
            ),
            Err((code, message)) => {
                debug!(handle, code, %message, "statement failed");
                sql_failure(code, message)
            }
        }
    }

    #[instrument(skip(self))]
    fn remove_database(&self, name: &str) -> Result<Reply> {
        check_name(name)?;
        let mut dbs = self.databases.lock().expect("storage lock poisoned");
        if let Some(handle) = dbs.handles.remove(name) {
            if let Some(db) = dbs.open.remove(&handle) {
                close(db);
            }
        }
        drop(dbs);

        let path = self.database_path(name)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(path = %path.display(), "database removed");
                Ok(Reply::no_result())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(sql_failure(DATABASE_ERR, format!("no database named {name}")))
            }
            Err(e) => Err(BridgeError::FileSystem(format!("remove {}: {e}", path.display()))),
        }
    }
}

enum StatementResult {
    Schema,
    Rows {
        rows: Vec<Value>,
        rows_affected: i64,
        insert_id: i64,
    },
}

fn is_schema_change(sql: &str) -> bool {
    let head = sql.trim_start();
    DDL_PREFIXES
        .iter()
        .any(|prefix| head.get(..prefix.len()).is_some_and(|h| h.eq_ignore_ascii_case(prefix)))
}

/// Prepare, bind and step one statement. Errors carry the SQL error code.
fn run_statement(conn: &Connection, sql: &str, params: &[Value]) -> std::result::Result<StatementResult, (i32, String)> {
    let mut stmt = conn.prepare(sql).map_err(|e| (SYNTAX_ERR, e.to_string()))?;

    for (i, param) in params.iter().enumerate() {
        let index = i + 1;
        let bound = match param {
            Value::Empty => continue,
            Value::Int32(n) => stmt.raw_bind_parameter(index, i64::from(*n)),
            Value::Int64(n) => stmt.raw_bind_parameter(index, *n),
            Value::Double(d) => stmt.raw_bind_parameter(index, *d),
            Value::Bool(b) => stmt.raw_bind_parameter(index, i64::from(*b)),
            Value::String(s) => stmt.raw_bind_parameter(index, s.as_str()),
            Value::Null => stmt.raw_bind_parameter(index, Null),
            Value::Array(_) | Value::Object(_) => {
                return Err((
                    DATABASE_ERR,
                    format!("parameter {index} has unsupported kind {}", param.kind()),
                ));
            }
        };
        bound.map_err(|e| (DATABASE_ERR, format!("bind parameter {index}: {e}")))?;
    }

    if is_schema_change(sql) {
        stmt.raw_execute().map_err(|e| (DATABASE_ERR, e.to_string()))?;
        return Ok(StatementResult::Schema);
    }

    if stmt.column_count() == 0 {
        let changed = stmt.raw_execute().map_err(|e| (DATABASE_ERR, e.to_string()))?;
        return Ok(StatementResult::Rows {
            rows: Vec::new(),
            rows_affected: i64::try_from(changed).unwrap_or(i64::MAX),
            insert_id: conn.last_insert_rowid(),
        });
    }

    let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
    let writes = !stmt.readonly();
    let mut rows = Vec::new();
    let mut cursor = stmt.raw_query();
    while let Some(row) = cursor.next().map_err(|e| (DATABASE_ERR, e.to_string()))? {
        let mut record = Object::new();
        for (i, column) in columns.iter().enumerate() {
            let cell = row.get_ref(i).map_err(|e| (DATABASE_ERR, e.to_string()))?;
            let value = match cell {
                ValueRef::Null => Value::Null,
                ValueRef::Integer(n) => Value::from(n),
                ValueRef::Real(d) => Value::Double(d),
                ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
                ValueRef::Blob(_) => {
                    return Err((DATABASE_ERR, format!("column {column} holds a blob")));
                }
            };
            // Repeated column names keep the first value.
            let _ = record.insert(column.as_str(), value);
        }
        rows.push(Value::Object(record));
    }
    drop(cursor);

    // `RETURNING` statements change rows too; a plain query reports nothing.
    let (rows_affected, insert_id) = if writes {
        (i64::try_from(conn.changes()).unwrap_or(i64::MAX), conn.last_insert_rowid())
    } else {
        (0, 0)
    };
    Ok(StatementResult::Rows {
        rows,
        rows_affected,
        insert_id,
    })
}

fn sql_failure(code: i32, message: impl Into<String>) -> Reply {
    Reply::failure(
        CallbackStatus::Error,
        Object::new().with("code", code).with("message", message.into()),
    )
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\', '\0']) || name.contains("..") {
        return Err(BridgeError::InvalidArgument(format!("invalid database name {name:?}")));
    }
    Ok(())
}

fn close(db: OpenDatabase) {
    let OpenDatabase { name, conn } = db;
    if let Err((_, e)) = conn.close() {
        warn!(database = %name, error = %e, "database did not close cleanly");
    } else {
        debug!(database = %name, "database closed");
    }
}

impl CommandHandler for Storage {
    fn on_register(&self, ctx: &ModuleContext) -> Result<()> {
        let root = ctx.data_dir.join("databases");
        fs::create_dir_all(&root).map_err(|e| BridgeError::FileSystem(format!("create {}: {e}", root.display())))?;
        let _ = self.root.set(root);
        Ok(())
    }

    fn execute(&self, invocation: Invocation<'_>) -> Result<Reply> {
        match invocation.action {
            "openDatabase" => {
                let args = invocation.args(&OPEN_SHAPE)?;
                let handle = self.open_database(args.string(0)?)?;
                Ok(Reply::success(handle))
            }
            "executeSql" => {
                let args = invocation.args(&EXECUTE_SHAPE)?;
                Ok(self.execute_sql(args.int32(0)?, args.string(1)?, args.array(2)?, args.string(3)?))
            }
            "removeDatabase" => {
                let args = invocation.args(&[KindSet::STRING])?;
                self.remove_database(args.string(0)?)
            }
            _ => Err(invocation.invalid_action()),
        }
    }

    fn on_shutdown(&self) -> Result<()> {
        let mut dbs = self.databases.lock().expect("storage lock poisoned");
        dbs.handles.clear();
        for (_, db) in dbs.open.drain() {
            close(db);
        }
        Ok(())
    }
}

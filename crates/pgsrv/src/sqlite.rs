//! SQLite backing engine.
//!
//! Each session gets its own SQLite connection to `<data_dir>/<database>`.
//! Catalog tables live in an in-memory database attached as `pg_catalog`, so
//! they never touch the user's file.
use crate::backend::{
    Backend, BackendConnection, BackendError, Column, PreparedStatement, Result, ResultSet,
    SessionInfo, UNRECOGNIZED_PARAMETER, Value,
};
use crate::catalog::{Catalog, CatalogTable, DEFAULT_SCHEMA, POSTGRES_SCHEMA};
use async_sqlite::rusqlite::functions::FunctionFlags;
use async_sqlite::rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};
use async_sqlite::rusqlite::{self, Connection, Statement, ToSql, params_from_iter};
use async_sqlite::{Client, ClientBuilder};
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Name returned by the identity functions (`current_user` and friends).
pub const ENGINE_IDENTITY: &str = "sqlite";

/// Opens SQLite databases under a data directory.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    data_dir: PathBuf,
}

impl SqliteBackend {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        SqliteBackend {
            data_dir: data_dir.into(),
        }
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    type Connection = SqliteConnection;

    async fn open(&self, info: &SessionInfo) -> Result<SqliteConnection> {
        if !self.data_dir.is_dir() {
            return Err(BackendError::MissingDataDir(
                self.data_dir.to_string_lossy().into_owned(),
            ));
        }

        let path = self.data_dir.join(&info.database);
        debug!(path = %path.display(), "opening sqlite database");
        let client = ClientBuilder::new().path(&path).open().await?;

        Ok(SqliteConnection { path, client })
    }
}

pub struct SqliteConnection {
    path: PathBuf,
    client: Client,
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SqliteConnection({})", self.path.to_string_lossy())
    }
}

#[async_trait]
impl BackendConnection for SqliteConnection {
    type Statement = SqliteStatement;

    async fn install_catalog(&self, catalog: Arc<Catalog>, info: &SessionInfo) -> Result<()> {
        let tables: Vec<_> = catalog
            .tables()
            .iter()
            .map(|table| {
                let rows = table.rows(info);
                (create_table_sql(table), insert_sql(table), rows, table.name)
            })
            .collect();
        let database = info.database.clone();

        self.client
            .conn(move |conn| {
                let attached: i64 = conn.query_row(
                    "SELECT count(*) FROM pragma_database_list WHERE name = ?1",
                    [POSTGRES_SCHEMA],
                    |row| row.get(0),
                )?;
                if attached == 0 {
                    conn.execute_batch(&format!(
                        "ATTACH DATABASE ':memory:' AS \"{POSTGRES_SCHEMA}\""
                    ))?;
                }

                for (create, insert, rows, name) in tables {
                    conn.execute_batch(&create)?;
                    let count: i64 = conn.query_row(
                        &format!("SELECT count(*) FROM \"{POSTGRES_SCHEMA}\".\"{name}\""),
                        [],
                        |row| row.get(0),
                    )?;
                    if count > 0 {
                        continue;
                    }
                    let mut stmt = conn.prepare(&insert)?;
                    for row in rows {
                        stmt.execute(params_from_iter(row.iter()))?;
                    }
                }

                register_functions(conn, catalog, database)
            })
            .await?;

        Ok(())
    }

    async fn query(&self, sql: &str) -> Result<ResultSet> {
        let sql = sql.to_string();
        let result = self
            .client
            .conn(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                run_statement(&mut stmt, &[])
            })
            .await?;
        Ok(result)
    }

    async fn prepare(&self, sql: &str) -> Result<SqliteStatement> {
        let sql = sql.to_string();
        let (columns, param_count) = self
            .client
            .conn({
                let sql = sql.clone();
                move |conn| {
                    let stmt = conn.prepare_cached(&sql)?;
                    let columns: Vec<_> =
                        stmt.column_names().into_iter().map(Column::new).collect();
                    Ok((columns, param_count(&stmt)))
                }
            })
            .await?;

        Ok(SqliteStatement {
            client: self.client.clone(),
            sql,
            columns,
            param_count,
        })
    }

    async fn close(self) -> Result<()> {
        self.client.close().await?;
        Ok(())
    }
}

/// A statement compiled through the connection's statement cache.
pub struct SqliteStatement {
    client: Client,
    sql: String,
    columns: Vec<Column>,
    param_count: usize,
}

impl fmt::Debug for SqliteStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStatement")
            .field("sql", &self.sql)
            .field("columns", &self.columns)
            .field("param_count", &self.param_count)
            .finish()
    }
}

#[async_trait]
impl PreparedStatement for SqliteStatement {
    fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn param_count(&self) -> usize {
        self.param_count
    }

    async fn query(&self, params: &[Option<String>]) -> Result<ResultSet> {
        let sql = self.sql.clone();
        let params = params.to_vec();
        let result = self
            .client
            .conn(move |conn| {
                let mut stmt = conn.prepare_cached(&sql)?;
                run_statement(&mut stmt, &params)
            })
            .await?;
        Ok(result)
    }
}

/// Number of parameters a Bind must supply.
///
/// `$N` placeholders count up to the highest N, even when lower numbers are
/// never referenced. SQLite itself numbers `$N` by first appearance.
fn param_count(stmt: &Statement<'_>) -> usize {
    (1..=stmt.parameter_count())
        .map(|idx| {
            stmt.parameter_name(idx)
                .and_then(|name| name.strip_prefix('$'))
                .and_then(|num| num.parse().ok())
                .unwrap_or(idx)
        })
        .max()
        .unwrap_or(0)
}

/// Bind text parameters, the i-th value going to `$i`.
///
/// Statements without `$N` placeholders (`?`, `?N`) bind by position.
fn bind_params(stmt: &mut Statement<'_>, params: &[Option<String>]) -> rusqlite::Result<()> {
    let expected = param_count(stmt);
    if params.len() != expected {
        return Err(rusqlite::Error::InvalidParameterCount(params.len(), expected));
    }

    let numbered = (1..=stmt.parameter_count())
        .any(|idx| stmt.parameter_name(idx).is_some_and(|name| name.starts_with('$')));
    for (idx, value) in params.iter().enumerate() {
        let pos = if numbered {
            match stmt.parameter_index(&format!("${}", idx + 1))? {
                Some(pos) => pos,
                // Unreferenced parameter.
                None => continue,
            }
        } else {
            idx + 1
        };
        stmt.raw_bind_parameter(pos, value)?;
    }
    Ok(())
}

/// Run a statement to completion, collecting every row.
fn run_statement(
    stmt: &mut Statement<'_>,
    params: &[Option<String>],
) -> rusqlite::Result<ResultSet> {
    bind_params(stmt, params)?;

    let columns: Vec<_> = stmt.column_names().into_iter().map(Column::new).collect();
    if columns.is_empty() {
        let affected = stmt.raw_execute()?;
        return Ok(ResultSet::command(affected));
    }

    let num_cols = columns.len();
    let mut rows = Vec::new();
    let mut cursor = stmt.raw_query();
    while let Some(row) = cursor.next()? {
        let values = (0..num_cols)
            .map(|idx| row.get_ref(idx).map(Value::from))
            .collect::<Result<Vec<_>, rusqlite::Error>>()?;
        rows.push(values);
    }

    Ok(ResultSet::rows(columns, rows))
}

fn create_table_sql(table: &CatalogTable) -> String {
    let cols = table
        .columns
        .iter()
        .map(|col| format!("\"{}\" {}", col.name, col.typ.sql_type()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TABLE IF NOT EXISTS \"{POSTGRES_SCHEMA}\".\"{}\" ({cols})",
        table.name
    )
}

fn insert_sql(table: &CatalogTable) -> String {
    let placeholders = (1..=table.columns.len())
        .map(|idx| format!("?{idx}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO \"{POSTGRES_SCHEMA}\".\"{}\" VALUES ({placeholders})",
        table.name
    )
}

/// Register the functions rewritten queries rely on.
fn register_functions(
    conn: &Connection,
    catalog: Arc<Catalog>,
    database: String,
) -> rusqlite::Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    let version = catalog.version();
    conn.create_scalar_function("version", 0, flags, move |_| Ok(version.clone()))?;

    for name in ["current_catalog", "current_schema"] {
        conn.create_scalar_function(name, 0, flags, |_| Ok(DEFAULT_SCHEMA))?;
    }
    for name in ["current_user", "session_user", "user"] {
        conn.create_scalar_function(name, 0, flags, |_| Ok(ENGINE_IDENTITY))?;
    }
    conn.create_scalar_function("current_database", 0, flags, move |_| {
        Ok(database.clone())
    })?;

    let settings = catalog.clone();
    conn.create_scalar_function("show", 1, flags, move |ctx| {
        let name: String = ctx.get(0)?;
        match settings.setting(&name) {
            Some(setting) => Ok(setting.value),
            None => Err(rusqlite::Error::UserFunctionError(
                format!("{UNRECOGNIZED_PARAMETER} \"{name}\"").into(),
            )),
        }
    })?;

    conn.create_scalar_function("format_type", 2, flags, move |ctx| {
        let oid: Option<i64> = ctx.get(0)?;
        let typmod: Option<i64> = ctx.get(1)?;
        Ok(oid.map(|oid| catalog.format_type(oid, typmod)))
    })?;

    Ok(())
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(v) => Value::Integer(v),
            ValueRef::Real(v) => Value::Real(v),
            ValueRef::Text(v) => Value::Text(String::from_utf8_lossy(v).into_owned()),
            ValueRef::Blob(v) => Value::Blob(v.to_vec()),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Integer(v) => ToSqlOutput::Owned(SqlValue::Integer(*v)),
            Value::Real(v) => ToSqlOutput::Owned(SqlValue::Real(*v)),
            Value::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            Value::Blob(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::SqlState;

    fn session(database: &str) -> SessionInfo {
        SessionInfo {
            database: database.to_string(),
            user: None,
        }
    }

    async fn open_with_catalog(dir: &tempfile::TempDir) -> SqliteConnection {
        let backend = SqliteBackend::new(dir.path());
        let info = session("test.db");
        let conn = backend.open(&info).await.unwrap();
        conn.install_catalog(Arc::new(Catalog::postgres()), &info)
            .await
            .unwrap();
        conn
    }

    fn single_value(result: &ResultSet) -> &Value {
        assert_eq!(1, result.rows.len(), "result: {result:?}");
        &result.rows[0][0]
    }

    #[tokio::test]
    async fn missing_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SqliteBackend::new(dir.path().join("missing"));
        let err = backend.open(&session("db")).await.unwrap_err();
        assert!(matches!(err, BackendError::MissingDataDir(_)));
    }

    #[tokio::test]
    async fn catalog_install_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_with_catalog(&dir).await;
        conn.install_catalog(Arc::new(Catalog::postgres()), &session("test.db"))
            .await
            .unwrap();

        let result = conn
            .query("SELECT count(*) FROM pg_catalog.pg_namespace")
            .await
            .unwrap();
        assert_eq!(&Value::Integer(4), single_value(&result));

        let result = conn
            .query("SELECT datname FROM pg_database")
            .await
            .unwrap();
        assert_eq!(&Value::Text("test.db".to_string()), single_value(&result));

        let result = conn.query("SELECT count(*) FROM pg_class").await.unwrap();
        assert_eq!(&Value::Integer(0), single_value(&result));

        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn catalog_functions() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_with_catalog(&dir).await;

        let tests = [
            ("SELECT current_user()", Value::Text("sqlite".to_string())),
            ("SELECT current_schema()", Value::Text("public".to_string())),
            ("SELECT current_database()", Value::Text("test.db".to_string())),
            ("SELECT show('timezone')", Value::Text("UTC".to_string())),
            (
                "SELECT format_type(1043, 14)",
                Value::Text("character varying(10)".to_string()),
            ),
            ("SELECT format_type(NULL, NULL)", Value::Null),
        ];
        for (sql, expected) in tests {
            let result = conn.query(sql).await.unwrap();
            assert_eq!(&expected, single_value(&result), "sql: {sql}");
        }

        let result = conn.query("SELECT version()").await.unwrap();
        match single_value(&result) {
            Value::Text(v) => assert!(v.starts_with("PostgreSQL 13.0.0")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn show_unknown_setting() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_with_catalog(&dir).await;

        let err = conn.query("SELECT show('nope')").await.unwrap_err();
        assert_eq!(SqlState::UndefinedObject, err.sql_state());
    }

    #[tokio::test]
    async fn user_tables() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_with_catalog(&dir).await;

        let result = conn
            .query("CREATE TABLE t (a INTEGER PRIMARY KEY, b TEXT)")
            .await
            .unwrap();
        assert!(!result.has_columns());

        let result = conn
            .query("INSERT INTO t VALUES (1, 'one'), (2, 'two')")
            .await
            .unwrap();
        assert_eq!(2, result.rows_affected);

        let err = conn.query("INSERT INTO t VALUES (1, 'dup')").await.unwrap_err();
        assert_eq!(SqlState::IntegrityConstraintViolation, err.sql_state());

        let err = conn.query("SELEC 1").await.unwrap_err();
        assert_eq!(SqlState::SyntaxErrorOrAccessRuleViolation, err.sql_state());
    }

    #[tokio::test]
    async fn prepared_statements() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_with_catalog(&dir).await;
        conn.query("CREATE TABLE t (a INTEGER, b TEXT)").await.unwrap();

        let insert = conn.prepare("INSERT INTO t VALUES (?1, ?2)").await.unwrap();
        assert_eq!(2, insert.param_count());
        assert!(insert.columns().is_empty());
        let result = insert
            .query(&[Some("1".to_string()), None])
            .await
            .unwrap();
        assert_eq!(1, result.rows_affected);

        let select = conn.prepare("SELECT a, b FROM t WHERE a = ?1").await.unwrap();
        assert_eq!(vec![Column::new("a"), Column::new("b")], select.columns());
        let result = select.query(&[Some("1".to_string())]).await.unwrap();
        // Text parameters compare through the column's integer affinity.
        assert_eq!(vec![vec![Value::Integer(1), Value::Null]], result.rows);
    }

    #[tokio::test]
    async fn numbered_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_with_catalog(&dir).await;
        conn.query("CREATE TABLE t (a INTEGER, b TEXT)").await.unwrap();
        conn.query("INSERT INTO t VALUES (1, 'one'), (2, 'two')")
            .await
            .unwrap();

        let select = conn.prepare("SELECT $2 AS p2, $1 AS p1").await.unwrap();
        assert_eq!(2, select.param_count());
        let result = select
            .query(&[Some("one".to_string()), Some("two".to_string())])
            .await
            .unwrap();
        assert_eq!(
            vec![vec![
                Value::Text("two".to_string()),
                Value::Text("one".to_string())
            ]],
            result.rows
        );

        let update = conn
            .prepare("UPDATE t SET b = $2 WHERE a = $1")
            .await
            .unwrap();
        let result = update
            .query(&[Some("2".to_string()), Some("deux".to_string())])
            .await
            .unwrap();
        assert_eq!(1, result.rows_affected);
        let result = conn.query("SELECT b FROM t ORDER BY a").await.unwrap();
        assert_eq!(
            vec![
                vec![Value::Text("one".to_string())],
                vec![Value::Text("deux".to_string())]
            ],
            result.rows
        );

        // Highest placeholder wins, referenced or not.
        let sparse = conn.prepare("SELECT $3").await.unwrap();
        assert_eq!(3, sparse.param_count());
        let result = sparse
            .query(&[None, None, Some("three".to_string())])
            .await
            .unwrap();
        assert_eq!(&Value::Text("three".to_string()), single_value(&result));

        let err = sparse.query(&[None]).await.unwrap_err();
        assert_eq!(SqlState::SyntaxErrorOrAccessRuleViolation, err.sql_state());
    }

    #[tokio::test]
    async fn show_keyword_setting() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_with_catalog(&dir).await;

        let sql = crate::rewrite::Rewriter::postgres().rewrite("SHOW ALL");
        let err = conn.query(&sql).await.unwrap_err();
        assert_eq!(SqlState::UndefinedObject, err.sql_state());

        let sql = crate::rewrite::Rewriter::postgres().rewrite("SHOW timezone");
        let result = conn.query(&sql).await.unwrap();
        assert_eq!(vec![Column::new("timezone")], result.columns);
        assert_eq!(&Value::Text("UTC".to_string()), single_value(&result));
    }
}

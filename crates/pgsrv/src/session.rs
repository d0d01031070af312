use crate::backend::{self, BackendConnection, BackendError, Column, PreparedStatement, ResultSet};
use crate::codec::FramedConn;
use crate::errors::{PgSrvError, Result};
use crate::messages::{
    BackendMessage, DescribeObjectType, ErrorResponse, FieldDescription, FrontendMessage, SqlState,
    TEXT_OID, TransactionStatus,
};
use crate::rewrite::Rewriter;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

/// Execution state of the statement bound in an extended query cycle.
#[derive(Debug)]
enum Execution {
    NotExecuted,
    /// Set while the backend runs the statement. Only observable if that
    /// execution was interrupted.
    Executing,
    Executed(ResultSet),
}

/// What the serving loop should do after an extended query cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Terminate,
}

/// The statement prepared by the last Parse along with its bound parameters.
///
/// Only the unnamed statement and portal are supported, so there's at most one
/// of these per session.
struct Portal<S> {
    stmt: S,
    params: Vec<Option<String>>,
    execution: Execution,
}

impl<S: PreparedStatement> Portal<S> {
    fn new(stmt: S) -> Self {
        Portal {
            stmt,
            params: Vec::new(),
            execution: Execution::NotExecuted,
        }
    }

    /// Bind parameters, starting a new execution cycle.
    ///
    /// Values are always interpreted as text.
    fn bind(&mut self, values: Vec<Option<Vec<u8>>>) {
        self.params = values
            .into_iter()
            .map(|v| v.map(|v| String::from_utf8_lossy(&v).into_owned()))
            .collect();
        self.execution = Execution::NotExecuted;
    }

    /// Execute the statement if it hasn't been executed for the current
    /// binding yet.
    async fn execute(&mut self) -> backend::Result<&ResultSet> {
        match self.execution {
            Execution::NotExecuted => {
                self.execution = Execution::Executing;
                match self.stmt.query(&self.params).await {
                    Ok(result) => self.execution = Execution::Executed(result),
                    Err(e) => {
                        self.execution = Execution::NotExecuted;
                        return Err(e);
                    }
                }
            }
            Execution::Executing => {
                return Err(BackendError::Internal(
                    "statement execution was interrupted".to_string(),
                ));
            }
            Execution::Executed(_) => (),
        }

        match &self.execution {
            Execution::Executed(result) => Ok(result),
            _ => Err(BackendError::Internal("statement not executed".to_string())),
        }
    }

    /// Execute if needed and take the result, ending this cycle.
    async fn into_result(mut self) -> backend::Result<ResultSet> {
        self.execute().await?;
        match self.execution {
            Execution::Executed(result) => Ok(result),
            _ => Err(BackendError::Internal("statement not executed".to_string())),
        }
    }
}

/// A client session that completed startup and is serving queries.
pub struct ClientSession<'a, C, B> {
    conn: FramedConn<C>,
    backend: B,
    rewriter: &'a Rewriter,
}

impl<'a, C, B> ClientSession<'a, C, B>
where
    C: AsyncRead + AsyncWrite + Unpin + Send,
    B: BackendConnection,
{
    pub fn new(conn: FramedConn<C>, backend: B, rewriter: &'a Rewriter) -> Self {
        ClientSession {
            conn,
            backend,
            rewriter,
        }
    }

    /// Serve queries until the client terminates or a fatal error occurs.
    ///
    /// The backend connection is closed regardless of how serving ends.
    pub async fn run(mut self) -> Result<()> {
        let result = self.serve().await;
        let ClientSession { mut conn, backend, .. } = self;
        if let Err(e) = backend.close().await {
            debug!(%e, "failed to close backend connection");
        }
        if let Err(e) = conn.shutdown().await {
            trace!(%e, "failed to shut down client connection");
        }
        result
    }

    async fn serve(&mut self) -> Result<()> {
        self.ready_for_query().await?;
        // Set when a message outside of a query cycle awaits its Sync.
        let mut sync_pending = false;
        loop {
            let msg = match self.conn.read().await? {
                Some(msg) => msg,
                None => {
                    trace!("connection closed");
                    return Ok(());
                }
            };

            match msg {
                FrontendMessage::Query { sql } => self.query(sql).await?,
                FrontendMessage::Parse { sql, .. } => {
                    if self.extended(sql).await? == Flow::Terminate {
                        return Ok(());
                    }
                }
                FrontendMessage::Close { name, .. } => {
                    trace!(%name, "close received");
                    self.conn.feed(BackendMessage::CloseComplete).await?;
                    sync_pending = true;
                }
                FrontendMessage::Sync => {
                    if sync_pending {
                        self.ready_for_query().await?;
                        sync_pending = false;
                    }
                }
                FrontendMessage::Flush => self.conn.flush().await?,
                FrontendMessage::Terminate => {
                    trace!("terminate received");
                    return Ok(());
                }
                other => {
                    let name = other.name();
                    self.send_fatal(format!("unexpected frontend message: {name}"))
                        .await?;
                    return Err(PgSrvError::UnexpectedFrontendMessage(name));
                }
            }
        }
    }

    /// Run a query through the simple query protocol.
    ///
    /// Every message for the query is buffered and flushed once at the end.
    async fn query(&mut self, sql: String) -> Result<()> {
        if is_empty_query(&sql) {
            self.conn.feed(BackendMessage::EmptyQueryResponse).await?;
            return self.ready_for_query().await;
        }

        let sql = self.rewriter.rewrite(&sql);
        match self.backend.query(&sql).await {
            Ok(result) => {
                if result.has_columns() {
                    self.feed_row_description(&result.columns).await?;
                }
                self.feed_result(&sql, result).await?;
            }
            Err(e) => {
                debug!(%e, %sql, "query failed");
                self.conn.feed(ErrorResponse::from(&e).into()).await?;
            }
        }

        self.ready_for_query().await
    }

    /// Run an extended query cycle, starting from a Parse message.
    ///
    /// Returns once the portal is executed, or after an error once the client
    /// syncs.
    async fn extended(&mut self, sql: String) -> Result<Flow> {
        let sql = self.rewriter.rewrite(&sql);
        let stmt = match self.backend.prepare(&sql).await {
            Ok(stmt) => stmt,
            Err(e) => return self.extended_error(e).await,
        };
        self.conn.feed(BackendMessage::ParseComplete).await?;

        let mut portal = Portal::new(stmt);
        loop {
            let msg = match self.conn.read().await? {
                Some(msg) => msg,
                None => {
                    trace!("connection closed during extended query");
                    return Ok(Flow::Terminate);
                }
            };

            match msg {
                FrontendMessage::Bind { param_values, .. } => {
                    portal.bind(param_values);
                    self.conn.feed(BackendMessage::BindComplete).await?;
                }
                FrontendMessage::Describe {
                    object_type: DescribeObjectType::Statement,
                    ..
                } => {
                    // Describe from prepared metadata, executing here could
                    // run a statement the client never executes.
                    let params = vec![TEXT_OID; portal.stmt.param_count()];
                    self.conn
                        .feed(BackendMessage::ParameterDescription(params))
                        .await?;
                    let columns = portal.stmt.columns().to_vec();
                    self.feed_row_description_or_no_data(&columns).await?;
                }
                FrontendMessage::Describe {
                    object_type: DescribeObjectType::Portal,
                    ..
                } => {
                    let columns = match portal.execute().await {
                        Ok(result) => result.columns.clone(),
                        Err(e) => return self.extended_error(e).await,
                    };
                    self.feed_row_description_or_no_data(&columns).await?;
                }
                FrontendMessage::Execute { .. } => {
                    let result = match portal.into_result().await {
                        Ok(result) => result,
                        Err(e) => return self.extended_error(e).await,
                    };
                    self.feed_result(&sql, result).await?;
                    self.ready_for_query().await?;
                    return Ok(Flow::Continue);
                }
                // Only the unnamed statement exists, closing it is a no-op.
                FrontendMessage::Close { .. } => {
                    self.conn.feed(BackendMessage::CloseComplete).await?;
                }
                FrontendMessage::Sync => self.ready_for_query().await?,
                FrontendMessage::Flush => self.conn.flush().await?,
                FrontendMessage::Terminate => {
                    trace!("terminate received");
                    return Ok(Flow::Terminate);
                }
                other => {
                    let name = other.name();
                    self.send_fatal(format!("unexpected message during extended query: {name}"))
                        .await?;
                    return Err(PgSrvError::UnexpectedExtendedMessage(name));
                }
            }
        }
    }

    /// Report a backend error during an extended query, then skip everything
    /// up to the next Sync.
    async fn extended_error(&mut self, e: BackendError) -> Result<Flow> {
        debug!(%e, "extended query failed");
        self.conn.feed(ErrorResponse::from(&e).into()).await?;
        self.conn.flush().await?;

        loop {
            match self.conn.read().await? {
                Some(FrontendMessage::Sync) => break,
                Some(FrontendMessage::Terminate) | None => return Ok(Flow::Terminate),
                Some(msg) => trace!(name = msg.name(), "discarding message until sync"),
            }
        }

        self.ready_for_query().await?;
        Ok(Flow::Continue)
    }

    async fn feed_row_description(&mut self, columns: &[Column]) -> Result<()> {
        let fields = columns
            .iter()
            .map(|col| FieldDescription::new_named(col.name.clone()))
            .collect();
        self.conn.feed(BackendMessage::RowDescription(fields)).await
    }

    async fn feed_row_description_or_no_data(&mut self, columns: &[Column]) -> Result<()> {
        if columns.is_empty() {
            self.conn.feed(BackendMessage::NoData).await
        } else {
            self.feed_row_description(columns).await
        }
    }

    /// Feed data rows followed by the command tag.
    async fn feed_result(&mut self, sql: &str, result: ResultSet) -> Result<()> {
        let tag = command_tag(sql, &result);
        for row in result.rows {
            self.conn.feed(BackendMessage::DataRow(row)).await?;
        }
        self.conn
            .feed(BackendMessage::CommandComplete { tag })
            .await
    }

    async fn send_fatal(&mut self, msg: String) -> Result<()> {
        let err = ErrorResponse::fatal(SqlState::ProtocolViolation, msg);
        self.conn.send(err.into()).await
    }

    /// Send ready for query, flushing everything buffered so far.
    async fn ready_for_query(&mut self) -> Result<()> {
        // Transactions are left to the backend, always report idle.
        self.conn
            .send(BackendMessage::ReadyForQuery(TransactionStatus::Idle))
            .await
    }
}

fn is_empty_query(sql: &str) -> bool {
    sql.chars().all(|c| c.is_whitespace() || c == ';')
}

/// Build the CommandComplete tag for a statement.
pub fn command_tag(sql: &str, result: &ResultSet) -> String {
    if result.has_columns() {
        return format!("SELECT {}", result.rows.len());
    }

    let mut words = sql
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_uppercase());
    let first = match words.next() {
        Some(word) => word,
        None => return String::new(),
    };

    match first.as_str() {
        "INSERT" => format!("INSERT 0 {}", result.rows_affected),
        "UPDATE" | "DELETE" => format!("{first} {}", result.rows_affected),
        "CREATE" | "DROP" | "ALTER" => match words.next() {
            Some(second) => format!("{first} {second}"),
            None => first,
        },
        _ => first,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Value;

    #[test]
    fn command_tags() {
        let rows = ResultSet::rows(
            vec![Column::new("a")],
            vec![vec![Value::Integer(1)], vec![Value::Integer(2)]],
        );
        let tests = [
            ("select a from t", &rows, "SELECT 2"),
            ("insert into t values (1)", &ResultSet::command(3), "INSERT 0 3"),
            ("UPDATE t SET a = 1", &ResultSet::command(2), "UPDATE 2"),
            ("delete from t", &ResultSet::command(0), "DELETE 0"),
            ("create table t (a int)", &ResultSet::command(0), "CREATE TABLE"),
            ("  drop index i", &ResultSet::command(0), "DROP INDEX"),
            ("begin", &ResultSet::command(0), "BEGIN"),
            ("", &ResultSet::command(0), ""),
        ];

        for (sql, result, expected) in tests {
            assert_eq!(expected, command_tag(sql, result), "sql: {sql}");
        }
    }

    #[test]
    fn empty_queries() {
        assert!(is_empty_query(""));
        assert!(is_empty_query("  \n ;"));
        assert!(!is_empty_query("select 1"));
    }
}

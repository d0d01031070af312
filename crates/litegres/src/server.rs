use crate::registry::{ConnectionInfo, Registry};
use parking_lot::Mutex;
use pgsrv::backend::Backend;
use pgsrv::handler::ProtocolHandler;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, debug_span, error, info, warn};
use uuid::Uuid;

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("data directory does not exist: {}", .0.display())]
    MissingDataDir(PathBuf),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    #[error("accept loop panicked: {0}")]
    AcceptLoopPanicked(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on. A bare `:port` listens on every interface.
    pub addr: String,
    /// Directory holding the database files. Must already exist.
    pub data_dir: PathBuf,
}

impl ServerConfig {
    pub fn new(addr: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        ServerConfig {
            addr: addr.into(),
            data_dir: data_dir.into(),
        }
    }

    /// The address to actually bind.
    pub fn bind_addr(&self) -> String {
        if self.addr.starts_with(':') {
            format!("0.0.0.0{}", self.addr)
        } else {
            self.addr.clone()
        }
    }
}

/// A running Postgres protocol server.
///
/// Connections are served until [`Server::close`] is called.
pub struct Server {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    registry: Arc<Registry>,
    accept_loop: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl Server {
    /// Bind the listener and start accepting connections in the background.
    pub async fn open<B: Backend>(
        config: &ServerConfig,
        handler: ProtocolHandler<B>,
    ) -> Result<Server> {
        if !config.data_dir.is_dir() {
            return Err(ServerError::MissingDataDir(config.data_dir.clone()));
        }

        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!(
            %local_addr,
            data_dir = %config.data_dir.display(),
            "listening for postgres connections"
        );

        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let registry = Arc::new(Registry::new());

        let accept = AcceptLoop {
            listener,
            handler: Arc::new(handler),
            shutdown: shutdown.clone(),
            tracker: tracker.clone(),
            registry: registry.clone(),
        };
        let accept_loop = tokio::spawn(accept.run());

        Ok(Server {
            local_addr,
            shutdown,
            tracker,
            registry,
            accept_loop: Mutex::new(Some(accept_loop)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Snapshot of the connections currently being served.
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.registry.connections()
    }

    /// Force-close every client connection, leaving the listener running.
    pub fn close_client_connections(&self) -> usize {
        let closed = self.registry.close_all();
        debug!(closed, "force closing client connections");
        closed
    }

    /// Force-close a single client connection. Returns false if there's no
    /// connection with that id.
    pub fn close_client_connection(&self, id: Uuid) -> bool {
        debug!(%id, "force closing client connection");
        self.registry.close(id)
    }

    /// Stop accepting connections, close every client connection, and wait
    /// for all connection workers to exit.
    ///
    /// Every resource is closed even if closing an earlier one fails, the
    /// first error is returned. Calling this again after it returns is a
    /// no-op.
    pub async fn close(&self) -> Result<()> {
        self.shutdown.cancel();

        let mut first_err = None;
        let accept_loop = self.accept_loop.lock().take();
        if let Some(accept_loop) = accept_loop {
            match accept_loop.await {
                Ok(Ok(())) => (),
                Ok(Err(e)) => first_err = Some(e),
                Err(e) => first_err = Some(e.into()),
            }
        }

        self.close_client_connections();
        self.tracker.close();
        self.tracker.wait().await;
        info!("server closed");

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

struct AcceptLoop<B> {
    listener: TcpListener,
    handler: Arc<ProtocolHandler<B>>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    registry: Arc<Registry>,
}

impl<B: Backend> AcceptLoop<B> {
    async fn run(self) -> Result<()> {
        loop {
            let (conn, client_addr) = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!("accept loop shutting down");
                    return Ok(());
                }
                result = self.listener.accept() => match result {
                    Ok(accepted) => accepted,
                    Err(_) if self.shutdown.is_cancelled() => return Ok(()),
                    Err(e) => {
                        error!(%e, "failed to accept connection");
                        return Err(ServerError::Accept(e));
                    }
                },
            };
            self.spawn_connection(conn, client_addr);
        }
    }

    fn spawn_connection(&self, conn: TcpStream, client_addr: SocketAddr) {
        let conn_id = Uuid::new_v4();
        // Child of the shutdown token, a connection accepted while shutting
        // down starts out cancelled.
        let token = self.shutdown.child_token();
        self.registry.register(conn_id, client_addr, token.clone());

        let handler = self.handler.clone();
        let registry = self.registry.clone();
        let shutdown = self.shutdown.clone();
        let span = debug_span!("pg_connection", %conn_id);

        self.tracker.spawn(
            async move {
                debug!(%client_addr, "client connected");
                // Dropping the protocol future closes both the client stream
                // and the backend connection.
                let result = tokio::select! {
                    result = handler.handle_connection(conn) => result,
                    _ = token.cancelled() => {
                        debug!(%client_addr, "client connection closed by server");
                        Ok(())
                    }
                };
                registry.deregister(conn_id);

                match result {
                    Ok(()) => debug!(%client_addr, "client disconnected"),
                    Err(e) if shutdown.is_cancelled() => {
                        debug!(%e, %client_addr, "client disconnected during shutdown")
                    }
                    Err(e) => warn!(%e, %client_addr, "client disconnected with error"),
                }
            }
            .instrument(span),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgsrv::sqlite::SqliteBackend;
    use std::time::Duration;
    use tokio_postgres::error::SqlState;
    use tokio_postgres::{Client, Config as ClientConfig, NoTls, SimpleQueryMessage};

    async fn open_server(dir: &tempfile::TempDir) -> Server {
        let config = ServerConfig::new("127.0.0.1:0", dir.path());
        let handler = ProtocolHandler::new(SqliteBackend::new(dir.path()));
        Server::open(&config, handler).await.unwrap()
    }

    async fn connect(server: &Server, dbname: &str) -> Result<Client, tokio_postgres::Error> {
        let (client, conn) = tokio::time::timeout(
            Duration::from_secs(5),
            ClientConfig::new()
                .user("litegres")
                .dbname(dbname)
                .host("127.0.0.1")
                .port(server.local_addr().port())
                .connect(NoTls),
        )
        .await
        .unwrap()?;
        tokio::spawn(conn);
        Ok(client)
    }

    async fn query_values(client: &Client, sql: &str) -> Vec<Vec<Option<String>>> {
        let messages = tokio::time::timeout(Duration::from_secs(5), client.simple_query(sql))
            .await
            .unwrap()
            .unwrap();
        messages
            .iter()
            .filter_map(|msg| match msg {
                SimpleQueryMessage::Row(row) => Some(
                    (0..row.len())
                        .map(|idx| row.get(idx).map(String::from))
                        .collect(),
                ),
                _ => None,
            })
            .collect()
    }

    async fn wait_for_connections(server: &Server, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while server.connections().len() != n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    fn value(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    #[test]
    fn bind_addr() {
        let tests = [
            (":5432", "0.0.0.0:5432"),
            ("127.0.0.1:6543", "127.0.0.1:6543"),
            ("localhost:0", "localhost:0"),
        ];
        for (addr, expected) in tests {
            assert_eq!(expected, ServerConfig::new(addr, "/tmp").bind_addr());
        }
    }

    #[tokio::test]
    async fn missing_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let config = ServerConfig::new("127.0.0.1:0", &missing);
        let handler = ProtocolHandler::new(SqliteBackend::new(&missing));
        let result = Server::open(&config, handler).await;
        assert!(matches!(result, Err(ServerError::MissingDataDir(_))));
    }

    #[tokio::test]
    async fn select_one() {
        let dir = tempfile::tempdir().unwrap();
        let server = open_server(&dir).await;

        let client = connect(&server, "test.db").await.unwrap();
        assert_eq!(vec![vec![value("1")]], query_values(&client, "select 1").await);

        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn queries_against_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let server = open_server(&dir).await;
        let client = connect(&server, "test.db").await.unwrap();

        client
            .simple_query("CREATE TABLE t (a INTEGER, b TEXT)")
            .await
            .unwrap();
        let messages = client
            .simple_query("INSERT INTO t VALUES (1, 'one'), (2, NULL)")
            .await
            .unwrap();
        assert!(
            messages
                .iter()
                .any(|msg| matches!(msg, SimpleQueryMessage::CommandComplete(2)))
        );

        assert_eq!(
            vec![vec![value("1"), value("one")], vec![value("2"), None]],
            query_values(&client, "SELECT a, b FROM t ORDER BY a").await
        );

        // Rewritten and catalog backed queries.
        assert_eq!(vec![vec![value("UTC")]], query_values(&client, "SHOW timezone").await);
        assert_eq!(
            vec![vec![value("sqlite")]],
            query_values(&client, "SELECT current_user").await
        );
        assert_eq!(
            vec![vec![value("test.db")]],
            query_values(&client, "SELECT datname FROM pg_catalog.pg_database").await
        );
        assert_eq!(
            vec![vec![value("SET")]],
            query_values(&client, "SET application_name = 'test'").await
        );

        // Errors leave the session usable.
        let err = client.simple_query("SELECT * FROM missing").await.unwrap_err();
        assert_eq!(
            Some(&SqlState::SYNTAX_ERROR_OR_ACCESS_RULE_VIOLATION),
            err.code()
        );
        let err = client.simple_query("SHOW nope").await.unwrap_err();
        assert_eq!(Some(&SqlState::UNDEFINED_OBJECT), err.code());
        assert_eq!(vec![vec![value("2")]], query_values(&client, "SELECT count(*) FROM t").await);

        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn prepared_queries() {
        let dir = tempfile::tempdir().unwrap();
        let server = open_server(&dir).await;
        let client = connect(&server, "test.db").await.unwrap();

        client
            .simple_query("CREATE TABLE t (a INTEGER, b TEXT)")
            .await
            .unwrap();
        client
            .simple_query("INSERT INTO t VALUES (1, 'one'), (2, 'two')")
            .await
            .unwrap();

        // Every call prepares, then closes the statement on drop.
        for _ in 0..2 {
            let rows = client
                .query("SELECT $2 AS p2, $1 AS p1", &[&"one", &"two"])
                .await
                .unwrap();
            assert_eq!(1, rows.len());
            assert_eq!("two", rows[0].get::<_, &str>("p2"));
            assert_eq!("one", rows[0].get::<_, &str>("p1"));
        }

        let updated = client
            .execute("UPDATE t SET b = $2 WHERE a = $1", &[&"2", &"deux"])
            .await
            .unwrap();
        assert_eq!(1, updated);
        assert_eq!(
            vec![vec![value("one")], vec![value("deux")]],
            query_values(&client, "SELECT b FROM t ORDER BY a").await
        );

        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn data_persists_across_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let server = open_server(&dir).await;

        let client = connect(&server, "test.db").await.unwrap();
        client.simple_query("CREATE TABLE t (a INTEGER)").await.unwrap();
        client.simple_query("INSERT INTO t VALUES (42)").await.unwrap();
        drop(client);

        let client = connect(&server, "test.db").await.unwrap();
        assert_eq!(vec![vec![value("42")]], query_values(&client, "SELECT a FROM t").await);
        assert!(dir.path().join("test.db").exists());

        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn invalid_database_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let server = open_server(&dir).await;

        let err = connect(&server, "../escape.db").await.unwrap_err();
        assert_eq!(Some(&SqlState::INVALID_CATALOG_NAME), err.code());

        // Listener unaffected.
        let client = connect(&server, "test.db").await.unwrap();
        assert_eq!(vec![vec![value("1")]], query_values(&client, "select 1").await);

        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn disconnect_deregisters() {
        let dir = tempfile::tempdir().unwrap();
        let server = open_server(&dir).await;

        let client = connect(&server, "test.db").await.unwrap();
        query_values(&client, "select 1").await;
        assert_eq!(1, server.connections().len());

        drop(client);
        wait_for_connections(&server, 0).await;

        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_client_connection() {
        let dir = tempfile::tempdir().unwrap();
        let server = open_server(&dir).await;

        let first = connect(&server, "test.db").await.unwrap();
        query_values(&first, "select 1").await;
        let first_id = server.connections()[0].id;
        let second = connect(&server, "test.db").await.unwrap();
        wait_for_connections(&server, 2).await;

        assert!(server.close_client_connection(first_id));
        wait_for_connections(&server, 1).await;
        assert!(!server.close_client_connection(first_id));
        assert!(first.simple_query("select 1").await.is_err());
        assert_eq!(vec![vec![value("1")]], query_values(&second, "select 1").await);

        assert_eq!(1, server.close_client_connections());
        wait_for_connections(&server, 0).await;
        assert!(second.simple_query("select 1").await.is_err());

        // Still accepting new connections.
        let third = connect(&server, "test.db").await.unwrap();
        assert_eq!(vec![vec![value("1")]], query_values(&third, "select 1").await);

        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_stops_everything() {
        let dir = tempfile::tempdir().unwrap();
        let server = open_server(&dir).await;

        let client = connect(&server, "test.db").await.unwrap();
        query_values(&client, "select 1").await;

        server.close().await.unwrap();
        assert!(server.connections().is_empty());
        assert!(client.simple_query("select 1").await.is_err());
        assert!(connect(&server, "test.db").await.is_err());

        // Closing again is fine.
        server.close().await.unwrap();
    }
}

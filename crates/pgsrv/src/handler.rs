use crate::backend::{Backend, BackendConnection, SessionInfo};
use crate::catalog::Catalog;
use crate::codec::{FramedConn, PgCodec};
use crate::errors::{PgSrvError, Result};
use crate::messages::{BackendMessage, ErrorResponse, SqlState, StartupMessage};
use crate::rewrite::Rewriter;
use crate::session::ClientSession;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

/// A wrapper around a backing engine that implements the Postgres
/// frontend/backend protocol.
pub struct ProtocolHandler<B> {
    backend: B,
    catalog: Arc<Catalog>,
    rewriter: Rewriter,
}

impl<B: Backend> ProtocolHandler<B> {
    pub fn new(backend: B) -> ProtocolHandler<B> {
        Self::with_catalog(backend, Arc::new(Catalog::postgres()), Rewriter::default())
    }

    pub fn with_catalog(
        backend: B,
        catalog: Arc<Catalog>,
        rewriter: Rewriter,
    ) -> ProtocolHandler<B> {
        ProtocolHandler {
            backend,
            catalog,
            rewriter,
        }
    }

    /// Run the protocol for a connection to completion.
    pub async fn handle_connection<C>(&self, mut conn: C) -> Result<()>
    where
        C: AsyncRead + AsyncWrite + Unpin + Send,
    {
        loop {
            let startup = PgCodec::decode_startup_from_conn(&mut conn).await?;
            trace!(?startup, "received startup message");

            match startup {
                StartupMessage::StartupRequest { params, .. } => {
                    return self.begin(conn, params).await;
                }
                StartupMessage::SSLRequest { .. } | StartupMessage::GssEncRequest { .. } => {
                    // Encryption not supported. Reject and let the client
                    // continue in plaintext.
                    trace!("rejecting encryption request");
                    conn.write_all(b"N").await?;
                }
                StartupMessage::CancelRequest { .. } => {
                    // Queries are never cancellable, there's nothing to do.
                    trace!("cancel received");
                    return Ok(());
                }
            }
        }
    }

    /// Open the backend for the session and start serving queries.
    async fn begin<C>(&self, conn: C, params: HashMap<String, String>) -> Result<()>
    where
        C: AsyncRead + AsyncWrite + Unpin + Send,
    {
        trace!(?params, "starting protocol");
        let mut framed = FramedConn::new(conn);

        let info = match validate_startup_params(&params) {
            Ok(info) => info,
            Err(resp) => {
                let msg = resp.message.clone();
                framed.send(resp.into()).await?;
                return Err(PgSrvError::StartupRejected(msg));
            }
        };

        let backend = match self.backend.open(&info).await {
            Ok(backend) => backend,
            Err(e) => {
                let msg = format!("failed to open database: {e}");
                let resp = ErrorResponse::fatal(e.sql_state(), msg);
                framed.send(resp.into()).await?;
                return Err(e.into());
            }
        };

        if let Err(e) = backend.install_catalog(self.catalog.clone(), &info).await {
            let resp = ErrorResponse::fatal_internal(format!("failed to install catalog: {e}"));
            framed.send(resp.into()).await?;
            if let Err(e) = backend.close().await {
                debug!(%e, "failed to close backend connection");
            }
            return Err(e.into());
        }

        debug!(database = %info.database, user = ?info.user, "session started");

        // Authentication is not supported, any user is accepted.
        framed.feed(BackendMessage::AuthenticationOk).await?;
        for (key, val) in self.catalog.startup_parameters() {
            framed
                .feed(BackendMessage::ParameterStatus {
                    key: key.to_string(),
                    val: val.to_string(),
                })
                .await?;
        }

        ClientSession::new(framed, backend, &self.rewriter).run().await
    }
}

/// Validate the startup parameters, returning the error to send to the client
/// if they're unusable.
fn validate_startup_params(
    params: &HashMap<String, String>,
) -> std::result::Result<SessionInfo, ErrorResponse> {
    let database = match params.get("database") {
        Some(database) if !database.is_empty() => database,
        _ => {
            return Err(ErrorResponse::fatal(
                SqlState::ProtocolViolation,
                "missing database name",
            ));
        }
    };

    // Databases are files under the data directory, don't allow escaping it.
    if database.contains("..") || Path::new(database).is_absolute() {
        return Err(ErrorResponse::fatal(
            SqlState::InvalidCatalogName,
            format!("invalid database name: {database}"),
        ));
    }

    Ok(SessionInfo {
        database: database.clone(),
        user: params.get("user").cloned(),
    })
}

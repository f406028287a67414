// src/proxy/session.rs

use super::pool::ServerPool;
use crate::load_balancer::{NoHealthyUpstream, RoundRobin};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    NoHealthyUpstream(#[from] NoHealthyUpstream),

    #[error("failed to dial upstream {address}: {source}")]
    Dial {
        address: String,
        source: std::io::Error,
    },

    #[error("session deadline exceeded")]
    DeadlineExceeded,
}

/// Why a session left the streaming state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    ClientClosed,
    UpstreamClosed,
    Aborted,
}

/// One proxied client-to-upstream pairing: dial a healthy upstream, pump
/// bytes both ways, close both connections on every exit path.
pub struct ProxySession {
    id: Uuid,
    client: TcpStream,
    peer: SocketAddr,
    deadline: Duration,
    abort_rx: watch::Receiver<bool>,
}

impl ProxySession {
    pub fn new(
        client: TcpStream,
        peer: SocketAddr,
        deadline: Duration,
        abort_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            client,
            peer,
            deadline,
            abort_rx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Drive the session to completion. The deadline bounds the whole
    /// session; when it fires the connections are dropped and the client
    /// must reconnect. Consumes the session, so both streams are released
    /// unconditionally when this returns.
    pub async fn run(
        self,
        router: &RoundRobin,
        pool: &ServerPool,
    ) -> Result<SessionEnd, SessionError> {
        let deadline = self.deadline;
        match timeout(deadline, self.proxy(router, pool)).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::DeadlineExceeded),
        }
    }

    async fn proxy(
        mut self,
        router: &RoundRobin,
        pool: &ServerPool,
    ) -> Result<SessionEnd, SessionError> {
        // Dialing: one routing decision per session, never retried. The
        // client reconnects to get a fresh decision.
        let upstream = router.next_healthy(pool)?;
        let mut backend =
            TcpStream::connect(&upstream.address)
                .await
                .map_err(|source| SessionError::Dial {
                    address: upstream.address.clone(),
                    source,
                })?;

        debug!(
            session = %self.id,
            peer = %self.peer,
            upstream = %upstream.address,
            "session established"
        );

        // Streaming: two copy directions race inside one select. Whichever
        // finishes first (EOF, error, or abort) ends the session; the losing
        // copy future is dropped with it, so nothing is left blocked, and
        // both streams close when this function returns.
        let (mut client_rd, mut client_wr) = self.client.split();
        let (mut backend_rd, mut backend_wr) = backend.split();

        let end = tokio::select! {
            res = io::copy(&mut client_rd, &mut backend_wr) => {
                match res {
                    Ok(bytes) => debug!(session = %self.id, bytes, "client closed connection"),
                    Err(e) => debug!(session = %self.id, error = %e, "client to upstream copy ended"),
                }
                SessionEnd::ClientClosed
            }
            res = io::copy(&mut backend_rd, &mut client_wr) => {
                match res {
                    Ok(bytes) => debug!(session = %self.id, bytes, "upstream closed connection"),
                    Err(e) => debug!(session = %self.id, error = %e, "upstream to client copy ended"),
                }
                SessionEnd::UpstreamClosed
            }
            _ = self.abort_rx.wait_for(|aborted| *aborted) => {
                debug!(session = %self.id, "session aborted by shutdown");
                SessionEnd::Aborted
            }
        };

        Ok(end)
    }
}

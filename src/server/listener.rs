use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::info;

use crate::config::Config;
use crate::http::connection::{Connection, ConnectionContext, GzipPolicy};
use crate::http::handler::Handler;
use crate::server::executor::{DefaultExecutor, Executor};
use crate::server::tempfile::{DefaultTempFileManagerFactory, TempFileManagerFactory};

const ACCEPT_BACKOFF_BASE_MS: u64 = 10;
const ACCEPT_BACKOFF_MAX_MS: u64 = 1000;

/// Pause after `failures` consecutive accept errors: doubles from 10 ms, capped at 1 s.
fn accept_backoff(failures: u32) -> Duration {
    if failures == 0 {
        return Duration::ZERO;
    }
    let delay = ACCEPT_BACKOFF_BASE_MS.saturating_mul(2u64.saturating_pow(failures - 1));
    Duration::from_millis(delay.min(ACCEPT_BACKOFF_MAX_MS))
}

/// Turns an accepted TCP socket into the stream a connection runs on.
///
/// Runs on the connection's own task, so a slow handshake never holds up the
/// accept loop. A TLS acceptor would wrap the socket here.
pub trait SocketAcceptor: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn accept(&self, socket: TcpStream) -> impl Future<Output = std::io::Result<Self::Stream>> + Send;
}

/// Serves plain TCP.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainAcceptor;

impl SocketAcceptor for PlainAcceptor {
    type Stream = TcpStream;

    fn accept(&self, socket: TcpStream) -> impl Future<Output = std::io::Result<TcpStream>> + Send {
        std::future::ready(Ok(socket))
    }
}

/// A bound listener plus everything needed to serve its connections.
///
/// ```ignore
/// let server = Server::bind(&Config::load()?, |req: &mut Request| {
///     Ok(Response::ok(format!("hello {}", req.uri)))
/// })
/// .await?;
/// server.run().await?;
/// ```
pub struct Server<A: SocketAcceptor = PlainAcceptor> {
    listener: TcpListener,
    handler: Arc<dyn Handler>,
    temp_files: Arc<dyn TempFileManagerFactory>,
    gzip_policy: GzipPolicy,
    read_timeout: Duration,
    memory_threshold: usize,
    executor: Arc<dyn Executor>,
    acceptor: Arc<A>,
    shutdown: watch::Sender<bool>,
}

impl Server<PlainAcceptor> {
    /// Binds `config.listen_addr()` and serves plain TCP with the default
    /// executor and temp-file manager.
    pub async fn bind(config: &Config, handler: impl Handler) -> anyhow::Result<Self> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(&addr).await?;
        info!(addr = %addr, "bound listener");

        Ok(Self {
            listener,
            handler: Arc::new(handler),
            temp_files: Arc::new(DefaultTempFileManagerFactory),
            gzip_policy: config.gzip_policy(),
            read_timeout: config.read_timeout(),
            memory_threshold: config.memory_threshold,
            executor: Arc::new(DefaultExecutor::new()),
            acceptor: Arc::new(PlainAcceptor),
            shutdown: watch::Sender::new(false),
        })
    }
}

impl<A: SocketAcceptor> Server<A> {
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_temp_file_factory(mut self, factory: impl TempFileManagerFactory + 'static) -> Self {
        self.temp_files = Arc::new(factory);
        self
    }

    pub fn with_gzip_policy(mut self, policy: GzipPolicy) -> Self {
        self.gzip_policy = policy;
        self
    }

    pub fn with_acceptor<B: SocketAcceptor>(self, acceptor: B) -> Server<B> {
        Server {
            listener: self.listener,
            handler: self.handler,
            temp_files: self.temp_files,
            gzip_policy: self.gzip_policy,
            read_timeout: self.read_timeout,
            memory_threshold: self.memory_threshold,
            executor: self.executor,
            acceptor: Arc::new(acceptor),
            shutdown: self.shutdown,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Connections currently being served.
    pub fn active_connections(&self) -> usize {
        self.executor.active_count()
    }

    fn context(&self) -> ConnectionContext {
        ConnectionContext {
            handler: Arc::clone(&self.handler),
            temp_files: Arc::clone(&self.temp_files),
            gzip_policy: Arc::clone(&self.gzip_policy),
            read_timeout: self.read_timeout,
            memory_threshold: self.memory_threshold,
        }
    }

    /// Accepts connections until [`Server::shutdown`] is called. Each
    /// connection is handed to the executor; this loop does nothing else.
    pub async fn run(&self) -> anyhow::Result<()> {
        let ctx = Arc::new(self.context());
        let mut stop = self.shutdown.subscribe();
        info!(addr = %self.local_addr()?, "listening");

        let mut failures = 0u32;
        loop {
            if *stop.borrow_and_update() {
                break;
            }

            tokio::select! {
                _ = stop.changed() => {}

                accepted = self.listener.accept() => match accepted {
                    Ok((socket, peer)) => {
                        failures = 0;
                        info!(%peer, "accepted connection");
                        self.dispatch(socket, peer, Arc::clone(&ctx));
                    }
                    Err(e) => {
                        failures = failures.saturating_add(1);
                        let delay = accept_backoff(failures);
                        tracing::error!(error = %e, ?delay, "accept failed, backing off");
                        tokio::select! {
                            _ = stop.changed() => {}
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                },
            }
        }

        info!("listener stopped");
        Ok(())
    }

    fn dispatch(&self, socket: TcpStream, peer: SocketAddr, ctx: Arc<ConnectionContext>) {
        let acceptor = Arc::clone(&self.acceptor);
        self.executor.submit(Box::pin(async move {
            let stream = match acceptor.accept(socket).await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::debug!(%peer, error = %e, "socket setup failed");
                    return;
                }
            };

            let mut conn = Connection::new(stream, Some(peer), ctx);
            if let Err(e) = conn.run().await {
                tracing::debug!(%peer, error = %e, "connection ended with an error");
            }
            tracing::debug!(%peer, "connection closed");
        }));
    }

    /// Stops the accept loop and force-closes every open connection.
    pub fn shutdown(&self) {
        info!("shutting down");
        self.shutdown.send_replace(true);
        self.executor.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_backoff_doubles_up_to_the_cap() {
        assert_eq!(accept_backoff(0), Duration::ZERO);
        assert_eq!(accept_backoff(1), Duration::from_millis(10));
        assert_eq!(accept_backoff(2), Duration::from_millis(20));
        assert_eq!(accept_backoff(5), Duration::from_millis(160));
        assert_eq!(accept_backoff(8), Duration::from_millis(1000));
        assert_eq!(accept_backoff(u32::MAX), Duration::from_millis(1000));
    }
}

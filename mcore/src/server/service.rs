use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use thiserror::Error;
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::{
    config::Config,
    server::{
        http::{self, HttpError, Method, Response, StatusCode},
        routes,
    },
    storage::Store,
};

pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    shared: Arc<ServerShared>,
}

pub(super) struct ServerShared {
    pub store: Store,
    pub static_dir: PathBuf,
    pub read_timeout: Duration,
}

const MIN_ACCEPT_BACKOFF: Duration = Duration::from_millis(10);
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Delay before the next accept after consecutive accept failures.
#[derive(Debug, Default)]
struct AcceptBackoff {
    delay: Option<Duration>,
}

impl AcceptBackoff {
    fn next_delay(&mut self) -> Duration {
        let delay = match self.delay {
            None => MIN_ACCEPT_BACKOFF,
            Some(d) => (d * 2).min(MAX_ACCEPT_BACKOFF),
        };
        self.delay = Some(delay);
        delay
    }

    fn reset(&mut self) {
        self.delay = None;
    }
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Server {
    pub async fn bind(config: &Config, store: Store) -> Result<Server, ServerError> {
        let listener = TcpListener::bind(config.listen_addr).await?;
        let local_addr = listener.local_addr()?;

        Ok(Server {
            listener,
            local_addr,
            shared: Arc::new(ServerShared {
                store,
                static_dir: config.static_dir.clone(),
                read_timeout: Duration::from_millis(config.read_timeout_ms),
            }),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts until the task is dropped, one spawned task per connection.
    pub async fn serve(self) {
        let mut backoff = AcceptBackoff::default();
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    backoff.reset();
                    let shared = self.shared.clone();
                    tokio::spawn(
                        handle_connection(shared, stream).instrument(info_span!("conn", %addr)),
                    );
                }
                // e.g. out of file descriptors, the listener itself stays usable
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(error = %e, ?delay, "error accepting connection");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

async fn handle_connection(shared: Arc<ServerShared>, mut stream: TcpStream) {
    let read = tokio::time::timeout(shared.read_timeout, http::read_request(&mut stream)).await;
    let (response, head_only) = match read {
        Err(_) => {
            debug!(timeout = ?shared.read_timeout, "request read timed out");
            (
                Response::text(StatusCode::RequestTimeout, "request timeout"),
                false,
            )
        }
        Ok(Ok(req)) => {
            let response = routes::route(&shared, &req).await;
            info!(
                method = %req.method,
                path = %req.path,
                status = response.status.code(),
                "request served"
            );
            (response, req.method == Method::Head)
        }
        Ok(Err(HttpError::UnexpectedEof)) | Ok(Err(HttpError::Io(_))) => {
            debug!("connection closed before a complete request");
            return;
        }
        Ok(Err(e)) => {
            warn!(error = %e, "bad request");
            (Response::text(e.status(), e.to_string()), false)
        }
    };

    if let Err(e) = stream.write_all(&response.to_bytes(head_only)).await {
        debug!(error = %e, "error writing response");
        return;
    }
    let _ = stream.shutdown().await;
}

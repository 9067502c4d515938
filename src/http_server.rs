//! HTTP server, request handling and session lifecycle
//!
//! One task per accepted connection; each session registers a cancellation
//! handle in the [`ShutdownRegistry`] so a process-level shutdown can
//! unblock in-flight sessions instead of leaving them hung.

use anyhow::{Context as _, Result};
use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioIo, TokioTimer};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Weak};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::log_request::LogRequest;
use crate::server_config::ServerConfig;
use crate::stream_body::{spawn_line_stream, LineBody};

type BoxBody = UnsyncBoxBody<Bytes, Infallible>;

/// How long a cancelled session may take to flush its in-flight response.
const SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_secs(5);

fn full<T: Into<Bytes>>(chunk: T) -> BoxBody {
    Full::new(chunk.into()).boxed_unsync()
}

fn plain_response(status: StatusCode, body: BoxBody) -> Response<BoxBody> {
    let mut res = Response::new(body);
    *res.status_mut() = status;
    res.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    res
}

fn bad_request(why: &'static str) -> Response<BoxBody> {
    plain_response(StatusCode::BAD_REQUEST, full(why))
}

fn not_found() -> Response<BoxBody> {
    plain_response(StatusCode::NOT_FOUND, full("Not found"))
}

fn internal_server_error(why: &'static str) -> Response<BoxBody> {
    plain_response(StatusCode::INTERNAL_SERVER_ERROR, full(why))
}

/// Cancellation handle for one live connection.
pub struct SessionHandle {
    peer: SocketAddr,
    token: CancellationToken,
}

/// Process-wide set of live session handles, consulted only at shutdown.
///
/// The registry never owns a session: entries are weak, and entries left
/// behind by closed sessions are swept on the next registration rather than
/// synchronously on session end.
#[derive(Default)]
pub struct ShutdownRegistry {
    sessions: Mutex<Vec<Weak<SessionHandle>>>,
}

impl ShutdownRegistry {
    pub fn register(&self, peer: SocketAddr) -> Arc<SessionHandle> {
        let handle = Arc::new(SessionHandle {
            peer,
            token: CancellationToken::new(),
        });

        let mut sessions = self.sessions.lock().unwrap();
        sessions.retain(|weak| weak.strong_count() > 0);
        sessions.push(Arc::downgrade(&handle));
        handle
    }

    /// Ask every still-live session to cancel. Safe to call from any task;
    /// expired entries are simply skipped.
    pub fn cancel_all(&self) {
        let sessions = self.sessions.lock().unwrap();
        for weak in sessions.iter() {
            if let Some(session) = weak.upgrade() {
                tracing::info!("Shutting down live session {}", session.peer);
                session.token.cancel();
            }
        }
    }

    pub fn live_sessions(&self) -> usize {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

pub struct TailServer {
    config: Arc<ServerConfig>,
    listener: TcpListener,
    registry: Arc<ShutdownRegistry>,
}

impl TailServer {
    /// Bind the listen socket. The server does not accept anything until
    /// [`serve`](TailServer::serve) is called.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let addr = SocketAddr::new(config.listen_addr, config.listen_port);
        let listener = TcpListener::bind(addr)
            .await
            .context("Failed to bind tail server")?;
        tracing::info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            config: Arc::new(config),
            listener,
            registry: Arc::new(ShutdownRegistry::default()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` resolves, then cancel every live
    /// session and wait for all of them to drain before returning.
    pub async fn serve(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let tracker = TaskTracker::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            tracing::error!("Failed to accept connection: {}", err);
                            continue;
                        }
                    };
                    tracing::debug!("Accepted connection from {}", peer_addr);

                    let handle = self.registry.register(peer_addr);
                    let config = self.config.clone();
                    tracker.spawn(Self::serve_session(stream, handle, config));
                }
                _ = &mut shutdown => break,
            }
        }

        self.registry.cancel_all();
        tracker.close();
        tracker.wait().await;
        tracing::info!("All sessions drained");

        Ok(())
    }

    /// Run one connection to completion: sequential request/response cycles
    /// with keep-alive, a read timeout on the idle gap, and cooperative
    /// cancellation from the shutdown registry.
    async fn serve_session(stream: TcpStream, handle: Arc<SessionHandle>, config: Arc<ServerConfig>) {
        let read_timeout = config.read_timeout();
        let io = TokioIo::new(stream);
        let service = service_fn(move |req| Self::handle_request(req, config.clone()));

        let conn = http1::Builder::new()
            .timer(TokioTimer::new())
            .header_read_timeout(read_timeout)
            .serve_connection(io, service);
        tokio::pin!(conn);

        let result = tokio::select! {
            res = conn.as_mut() => res,
            _ = handle.token.cancelled() => {
                // Finish the in-flight response, then close instead of
                // reading further requests. A client that stops reading
                // must not be able to stall shutdown, so the drain is
                // bounded.
                conn.as_mut().graceful_shutdown();
                match tokio::time::timeout(SHUTDOWN_GRACE, conn.as_mut()).await {
                    Ok(res) => res,
                    Err(_) => {
                        tracing::warn!("Session {} did not drain in time, dropping it", handle.peer);
                        Ok(())
                    }
                }
            }
        };

        if let Err(err) = result {
            if err.is_incomplete_message() {
                // A keep-alive client closed the socket between requests;
                // routine, not worth an error line.
                tracing::trace!("Early end of stream from {}", handle.peer);
            } else {
                tracing::error!("Error in session {}: {}", handle.peer, err);
            }
        }
    }

    /// Outermost per-request boundary: every failure inside becomes a 500
    /// response rather than an error escaping into the connection task.
    async fn handle_request(
        req: Request<Incoming>,
        config: Arc<ServerConfig>,
    ) -> Result<Response<BoxBody>, Infallible> {
        tracing::info!("Request: {} {}", req.method(), req.uri());

        match Self::try_handle(req, config).await {
            Ok(res) => Ok(res),
            Err(err) => {
                tracing::error!("Error in request handler: {:#}", err);
                Ok(internal_server_error("Internal server error"))
            }
        }
    }

    async fn try_handle(
        req: Request<Incoming>,
        config: Arc<ServerConfig>,
    ) -> Result<Response<BoxBody>> {
        if req.method() != Method::GET {
            return Ok(bad_request("Unsupported HTTP verb"));
        }

        let target = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| req.uri().path());
        let Some(request) = LogRequest::parse(target, config.max_request_lines) else {
            return Ok(bad_request("Invalid request"));
        };

        let full_path = config.root_dir.join(&request.file_path);
        tracing::trace!("Going to open the file at {}", full_path.display());

        match tokio::fs::metadata(&full_path).await {
            Ok(metadata) if metadata.is_file() => {}
            _ => return Ok(not_found()),
        }
        let file = match tokio::fs::File::open(&full_path).await {
            Ok(file) => file.into_std().await,
            Err(_) => return Ok(not_found()),
        };

        let n = request.n.unwrap_or(config.default_lines);
        let mut rx = spawn_line_stream(file, n, request.grep, config.tail_params());

        // Pull the first line before committing to a status: a scan that
        // fails immediately can still be reported as a 500. Later failures
        // can only truncate the stream.
        let first = match rx.recv().await {
            Some(Ok(line)) => line,
            Some(Err(err)) => {
                tracing::error!("Tail scan failed for {}: {}", full_path.display(), err);
                return Ok(internal_server_error("Internal server error"));
            }
            None => return Ok(plain_response(StatusCode::OK, full(""))),
        };

        Ok(plain_response(
            StatusCode::OK,
            LineBody::new(first, rx).boxed_unsync(),
        ))
    }
}

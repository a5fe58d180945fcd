//! HTTP server and shutdown.
//!
//! The server is bound first and served second, so callers learn the
//! ephemeral port before the first request goes out.
//!
//! # Shutdown
//!
//! When the shutdown future resolves the server:
//! 1. Stops `listener.accept()` and drops the listener, so the port refuses
//!    new connections.
//! 2. Aborts every connection task, idle keep-alive connections included.
//! 3. Returns from [`Server::serve_with_shutdown`].

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::Error;
use crate::mux::{Mux, Pipeline};
use crate::request::Request;
use crate::response::Response;

/// The HTTP server.
pub struct Server {
    listener: TcpListener,
    addr: SocketAddr,
}

impl Server {
    /// Binds the listener. Port `0` asks the OS for a free port; read it
    /// back with [`local_addr`](Server::local_addr).
    pub async fn bind(addr: SocketAddr) -> Result<Self, Error> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        Ok(Self { listener, addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Accepts connections and dispatches them through `mux` until
    /// `shutdown` resolves.
    pub async fn serve_with_shutdown<F>(self, mux: Mux, shutdown: F) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        let Self { listener, addr } = self;
        let pipeline = mux.into_pipeline();

        info!(%addr, "test server listening");

        let mut tasks = tokio::task::JoinSet::new();

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Check shutdown first so teardown wins over queued connections.
                biased;

                () = &mut shutdown => {
                    info!(open = tasks.len(), "shutdown requested, closing connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let pipeline = pipeline.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let pipeline = pipeline.clone();
                            async move { dispatch(pipeline, req).await }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        drop(listener);
        tasks.shutdown().await;

        info!(%addr, "test server stopped");
        Ok(())
    }
}

/// Collects the body and runs one request through the pipeline.
///
/// Infallible: every failure becomes a response so hyper never sees an error.
async fn dispatch(
    pipeline: Pipeline,
    req: hyper::Request<Incoming>,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();

    let response = match body.collect().await {
        Ok(collected) => pipeline.call(Request::new(parts, collected.to_bytes())).await,
        Err(e) => {
            error!("request body error: {e}");
            Response::status(StatusCode::BAD_REQUEST)
        }
    };

    Ok(response.into_inner())
}

use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};

use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::{body::Incoming, server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use log::{debug, error, info};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::{EdgeError, LoadBalancer, proxy};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Accepts HTTP/1.1 connections until `cancel` fires.
///
/// The balancer answers `GET /health` itself and serves read-only JSON views
/// at `GET /api/backends` and `GET /api/metrics`. Every other request is
/// proxied.
pub async fn serve(
    listener: TcpListener,
    lb: Arc<LoadBalancer>,
    cancel: CancellationToken,
) -> Result<(), EdgeError> {
    info!("Listening on http://{}", listener.local_addr()?);

    loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Accept failed: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            },
        };

        let lb = Arc::clone(&lb);
        let service = service_fn(move |req: Request<Incoming>| {
            let lb = Arc::clone(&lb);
            async move { Ok::<_, Infallible>(route(&lb, req, peer).await) }
        });

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!("Connection from {} closed with error: {}", peer, e);
            }
        });
    }

    info!("Listener stopped");
    Ok(())
}

async fn route(lb: &LoadBalancer, req: Request<Incoming>, peer: SocketAddr) -> Response<Full<Bytes>> {
    if req.method() == Method::GET {
        match req.uri().path() {
            "/health" => return proxy::simple_response(StatusCode::OK, "ok"),
            "/api/backends" => return proxy::json_response(&lb.backends()),
            "/api/metrics" => return proxy::json_response(&lb.metrics()),
            _ => {}
        }
    }
    lb.serve(req, Some(peer)).await
}

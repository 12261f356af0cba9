use std::{convert::Infallible, net::SocketAddr, time::Duration};

use bytes::Bytes;
use clap::Parser;
use http_body_util::Full;
use hyper::{Request, Response, body::Incoming, server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(version, about = "Minimal HTTP/1.1 backend for flux")]
struct Cli {
    #[arg(long, default_value_t = 8081)]
    port: u16,

    /// Simulated processing time per request
    #[arg(long, default_value_t = 10)]
    delay_ms: u64,
}

async fn handle_request(
    req: Request<Incoming>,
    port: u16,
    delay: Duration,
) -> Result<Response<Full<Bytes>>, Infallible> {
    if req.uri().path() == "/health" {
        return Ok(Response::new(Full::new(Bytes::from("OK"))));
    }

    tokio::time::sleep(delay).await;
    Ok(Response::new(Full::new(Bytes::from(format!(
        "Response from backend on port {port}\n"
    )))))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    let addr: SocketAddr = format!("127.0.0.1:{}", cli.port).parse()?;
    let delay = Duration::from_millis(cli.delay_ms);

    let listener = TcpListener::bind(addr).await?;
    println!("Test backend listening on http://{}", addr);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let port = cli.port;
        let service = service_fn(move |req| handle_request(req, port, delay));

        tokio::spawn(async move {
            let _ = http1::Builder::new().serve_connection(io, service).await;
        });
    }
}

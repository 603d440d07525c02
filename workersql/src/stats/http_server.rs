//! OpenMetrics endpoint.

use std::convert::Infallible;
use std::net::SocketAddr;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::info;

use super::render;

async fn metrics(
    _: Request<hyper::body::Incoming>,
    namespace: Option<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let metrics_data = render(namespace.as_deref());
    let response = Response::builder()
        .header(
            hyper::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )
        .body(Full::new(Bytes::from(metrics_data)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from("Metrics unavailable"))));

    Ok(response)
}

pub async fn server(port: u16, namespace: Option<String>) -> std::io::Result<()> {
    info!("OpenMetrics endpoint http://0.0.0.0:{}", port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let namespace = namespace.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |request| metrics(request, namespace.clone()));
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                eprintln!("OpenMetrics endpoint error: {:?}", err);
            }
        });
    }
}

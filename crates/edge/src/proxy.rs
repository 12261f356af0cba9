use std::net::SocketAddr;

use bytes::Bytes;
use http::{
    HeaderMap, HeaderValue, Request, Response, StatusCode, Uri,
    header::{CONTENT_LENGTH, CONTENT_TYPE},
    request::Parts,
};
use http_body_util::Full;
use log::error;
use serde::Serialize;

use flux_lb::Backend;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

fn is_hop_header(name: &str) -> bool {
    matches!(
        name,
        "connection"
            | "keep-alive"
            | "proxy-connection"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Joins the backend base address and the inbound path with exactly one `/`.
pub fn upstream_uri(backend: &Backend, path_and_query: &str) -> Result<Uri, http::Error> {
    let base = backend.address();
    let uri = match (base.ends_with('/'), path_and_query.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path_and_query[1..]),
        (false, false) => format!("{}/{}", base, path_and_query),
        _ => format!("{}{}", base, path_and_query),
    };
    Ok(uri.parse::<Uri>()?)
}

/// Rebuilds an inbound request so it can be sent to `backend`.
pub fn build_upstream_request(
    backend: &Backend,
    parts: Parts,
    body: Bytes,
    peer: Option<SocketAddr>,
) -> Result<Request<Full<Bytes>>, http::Error> {
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let uri = upstream_uri(backend, path_and_query)?;

    let mut request = Request::new(Full::new(body));
    *request.method_mut() = parts.method;
    *request.uri_mut() = uri;

    let headers = request.headers_mut();
    copy_end_to_end_headers(&parts.headers, headers);

    if let Some(peer) = peer {
        let client_ip = peer.ip().to_string();
        let forwarded = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(prior) => format!("{}, {}", prior, client_ip),
            None => client_ip,
        };
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_str(&forwarded)?);
    }

    Ok(request)
}

pub fn backend_response(status: StatusCode, headers: &HeaderMap, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    copy_end_to_end_headers(headers, response.headers_mut());
    response.headers_mut().remove(CONTENT_LENGTH);
    response
}

pub fn simple_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

/// Serializes `value` as an `application/json` 200 response.
pub fn json_response<T: Serialize + ?Sized>(value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut response = Response::new(Full::new(Bytes::from(body)));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(err) => {
            error!("Failed to encode JSON response: {}", err);
            simple_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error\n")
        }
    }
}

fn copy_end_to_end_headers(from: &HeaderMap, to: &mut HeaderMap) {
    for (name, value) in from.iter() {
        if is_hop_header(name.as_str()) {
            continue;
        }
        to.append(name.clone(), value.clone());
    }
}

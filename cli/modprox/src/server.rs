//! HTTP front end for the resolver.
//!
//! One fallback handler receives every request except the banner, parses it
//! into a [`Route`] and hands it to the [`Resolver`] on the blocking pool.
//! Uploads are read part by part with the size limits enforced as chunks
//! arrive; archive downloads are streamed in fixed-size chunks.

use std::io::{self, Read};
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::{net::TcpListener, sync::mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use modprox_protocol::{
    Method, Part, ProtocolError, ProxyResponse, Resolver, ResponseBody, Route, UploadForm,
};
use modprox_storage::{Archive, Coordinate, Version};

const ARCHIVE_CHUNK: usize = 64 << 10;
const ARCHIVE_QUEUE: usize = 4;

/// Shared state for the handlers.
#[derive(Clone)]
struct AppState {
    resolver: Arc<Resolver>,
}

/// Build the router serving `resolver`.
pub fn router(resolver: Resolver) -> Router {
    let body_limit = usize::try_from(resolver.limits().max_body_bytes()).unwrap_or(usize::MAX);
    let state = AppState {
        resolver: Arc::new(resolver),
    };

    Router::new()
        .route("/", get(banner))
        .fallback(dispatch)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

/// Serve `resolver` on `bind` until interrupted.
pub async fn serve(bind: &str, resolver: Resolver) -> Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address '{bind}'"))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    info!(%addr, "serving module proxy");
    axum::serve(listener, router(resolver))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("interrupt received, shutting down"),
        Err(err) => {
            warn!(error = %err, "cannot listen for interrupts");
            std::future::pending::<()>().await;
        }
    }
}

async fn banner() -> &'static str {
    "modprox module proxy\n"
}

async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let head = request.method() == axum::http::Method::HEAD;
    let response = route_request(state, request).await;
    if head {
        // Headers as for GET, including the archive length.
        let (parts, _) = response.into_parts();
        return Response::from_parts(parts, Body::empty());
    }
    response
}

async fn route_request(state: AppState, request: Request) -> Response {
    let path = request.uri().path().to_string();
    let method = match *request.method() {
        axum::http::Method::GET | axum::http::Method::HEAD => Method::Get,
        axum::http::Method::POST => Method::Post,
        ref other => {
            return error_response(&ProtocolError::NoRoute {
                method: other.to_string(),
                path,
            })
        }
    };

    let route = match Route::parse(method, &path) {
        Ok(route) => route,
        Err(err) => return error_response(&err),
    };

    match route {
        Route::Upload {
            coordinate,
            version,
        } => upload(state, coordinate, version, request).await,
        route => {
            let resolver = Arc::clone(&state.resolver);
            blocking(move || resolver.resolve(&route)).await
        }
    }
}

async fn upload(
    state: AppState,
    coordinate: Coordinate,
    version: Version,
    request: Request,
) -> Response {
    let multipart = match Multipart::from_request(request, &state).await {
        Ok(multipart) => multipart,
        Err(rejection) => return rejection.into_response(),
    };
    let form = match read_form(state.resolver.upload_form(), multipart).await {
        Ok(form) => form,
        Err(response) => return response,
    };

    let resolver = Arc::clone(&state.resolver);
    blocking(move || resolver.upload(&coordinate, &version, form)).await
}

/// Collect the upload parts, refusing any part as soon as it outgrows its
/// limit.
async fn read_form(
    mut form: UploadForm,
    mut multipart: Multipart,
) -> std::result::Result<UploadForm, Response> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(IntoResponse::into_response)?
    {
        let name = field.name().unwrap_or_default().to_string();
        let part = Part::from_name(&name).map_err(|e| error_response(&e))?;

        let mut data = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(IntoResponse::into_response)?
        {
            form.check_size(part, (data.len() + chunk.len()) as u64)
                .map_err(|e| error_response(&e))?;
            data.extend_from_slice(&chunk);
        }
        form.add_part(part, data).map_err(|e| error_response(&e))?;
    }
    Ok(form)
}

async fn blocking<F>(op: F) -> Response
where
    F: FnOnce() -> ProxyResponse + Send + 'static,
{
    match tokio::task::spawn_blocking(op).await {
        Ok(response) => into_response(response),
        Err(err) => {
            error!(error = %err, "request handler panicked");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "request handler failed\n",
            )
                .into_response()
        }
    }
}

fn error_response(err: &ProtocolError) -> Response {
    into_response(ProxyResponse::from_error(err))
}

fn into_response(response: ProxyResponse) -> Response {
    let status =
        StatusCode::from_u16(response.status.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match response.body {
        ResponseBody::Bytes(bytes) => {
            (status, [(header::CONTENT_TYPE, response.content_type)], bytes).into_response()
        }
        ResponseBody::Stream(archive) => {
            let headers = [
                (header::CONTENT_TYPE, response.content_type.to_string()),
                (header::CONTENT_LENGTH, archive.len.to_string()),
            ];
            let body = Body::from_stream(stream_archive(archive));
            (status, headers, body).into_response()
        }
    }
}

/// Pump an archive reader through a bounded channel from the blocking pool.
fn stream_archive(archive: Archive) -> ReceiverStream<io::Result<Vec<u8>>> {
    let (tx, rx) = mpsc::channel(ARCHIVE_QUEUE);
    let mut reader = archive.reader;
    tokio::task::spawn_blocking(move || {
        let mut buf = vec![0; ARCHIVE_CHUNK];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    // Receiver gone: the client hung up.
                    if tx.blocking_send(Ok(buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(error = %err, "archive read failed mid-stream");
                    let _ = tx.blocking_send(Err(err));
                    break;
                }
            }
        }
    });
    ReceiverStream::new(rx)
}

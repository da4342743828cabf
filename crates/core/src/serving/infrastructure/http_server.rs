//! actix-web server exposing the current document as JSON.
//!
//! The server runs on its own thread with a dedicated actix system so the
//! capture pipeline never shares a runtime with request handling.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use actix_web::dev::ServerHandle;
use actix_web::{web, App, HttpResponse, HttpServer};
use crossbeam_channel::Sender;

use crate::pipeline::state_holder::StateHolder;
use crate::serving::document_body::{render_document, JSON_CONTENT_TYPE};
use crate::serving::serving_error::ServingError;
use crate::shared::constants::{DEFAULT_HTTP_HOST, DEFAULT_HTTP_PORT};

const HTTP_WORKERS: usize = 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HTTP_HOST.to_string(),
            port: DEFAULT_HTTP_PORT,
        }
    }
}

/// Handle for the running server thread.
pub struct HttpServerHandle {
    local_addr: SocketAddr,
    server: ServerHandle,
    thread: JoinHandle<()>,
}

impl HttpServerHandle {
    /// Address actually bound, which differs from the configured one for port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections, finishes in-flight requests, then joins
    /// the server thread.
    pub fn stop(self) {
        actix_web::rt::System::new().block_on(self.server.stop(true));
        if self.thread.join().is_err() {
            log::error!("HTTP server thread panicked");
        }
    }

    /// Blocks until the server exits on its own, e.g. on SIGINT.
    pub fn wait(self) {
        if self.thread.join().is_err() {
            log::error!("HTTP server thread panicked");
        }
    }
}

type Ready = Result<(ServerHandle, SocketAddr), String>;

/// Binds the configured address and starts serving `GET /`.
///
/// Returns once the listener is bound, so a bind failure is reported here
/// rather than on the server thread.
pub fn spawn_http_server(
    state: Arc<StateHolder>,
    config: &ServerConfig,
) -> Result<HttpServerHandle, ServingError> {
    let addr = config.bind_addr();
    let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Ready>(1);

    let thread = thread::Builder::new().name("http-server".into()).spawn({
        let addr = addr.clone();
        move || run_server(state, addr, ready_tx)
    })?;

    match ready_rx.recv() {
        Ok(Ok((server, local_addr))) => {
            log::info!("Serving current document on http://{local_addr}/");
            Ok(HttpServerHandle {
                local_addr,
                server,
                thread,
            })
        }
        Ok(Err(reason)) => {
            let _ = thread.join();
            Err(ServingError::Bind { addr, reason })
        }
        Err(_) => {
            let _ = thread.join();
            Err(ServingError::Startup)
        }
    }
}

fn run_server(state: Arc<StateHolder>, addr: String, ready: Sender<Ready>) {
    let result = actix_web::rt::System::new().block_on(async move {
        let data = web::Data::from(state);
        let server = HttpServer::new(move || App::new().app_data(data.clone()).configure(routes))
            .workers(HTTP_WORKERS)
            .bind(addr.as_str());
        let server = match server {
            Ok(server) => server,
            Err(e) => {
                let _ = ready.send(Err(e.to_string()));
                return Ok(());
            }
        };
        let Some(local_addr) = server.addrs().first().copied() else {
            let _ = ready.send(Err("no address resolved".into()));
            return Ok(());
        };

        let server = server.run();
        let _ = ready.send(Ok((server.handle(), local_addr)));
        server.await
    });

    if let Err(e) = result {
        log::error!("HTTP server error: {e}");
    }
}

/// Registers the JSON endpoint.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(document_handler));
}

async fn document_handler(state: web::Data<StateHolder>) -> HttpResponse {
    let current = state.get();
    match render_document(current.as_deref()) {
        Ok(body) => HttpResponse::Ok()
            .content_type(JSON_CONTENT_TYPE)
            .body(body),
        Err(e) => {
            log::error!("Failed to serialize document: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

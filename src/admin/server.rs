//! Admin Server
//!
//! Serves `admin_routes` on the admin port as the controller's front door.
//! The listener is bound synchronously in `open` so a taken port aborts
//! startup; serving runs on the given tokio runtime until `close`.

use std::net::{SocketAddr, TcpListener as StdTcpListener};

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};

use super::routes::admin_routes;
use crate::controller::{ControlHandle, ControllerError, ControllerResult, FrontDoor};
use crate::observability::{log_event_with_fields, Event, Logger};

/// HTTP front door for status and lifecycle actions
pub struct AdminServer {
    addr: SocketAddr,
    runtime: Handle,
    local_addr: Option<SocketAddr>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl AdminServer {
    /// Create a closed server for `addr` that will serve on `runtime`.
    pub fn new(addr: SocketAddr, runtime: Handle) -> Self {
        Self {
            addr,
            runtime,
            local_addr: None,
            shutdown: None,
        }
    }

    /// Bound address while open (resolves port 0)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn failed(&self, reason: impl ToString) -> ControllerError {
        ControllerError::FrontDoor {
            name: self.name().to_string(),
            reason: reason.to_string(),
        }
    }
}

impl FrontDoor for AdminServer {
    fn name(&self) -> &'static str {
        "admin"
    }

    fn open(&mut self, handle: ControlHandle) -> ControllerResult<()> {
        if self.shutdown.is_some() {
            return Ok(());
        }

        let std_listener = StdTcpListener::bind(self.addr).map_err(|e| self.failed(e))?;
        std_listener
            .set_nonblocking(true)
            .map_err(|e| self.failed(e))?;
        let local_addr = std_listener.local_addr().map_err(|e| self.failed(e))?;

        let listener = {
            let _runtime = self.runtime.enter();
            tokio::net::TcpListener::from_std(std_listener).map_err(|e| self.failed(e))?
        };

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        let router = admin_routes(handle).layer(cors);

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        self.runtime.spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = served {
                let reason = e.to_string();
                Logger::error("FRONT_DOOR_FAILED", &[("name", "admin"), ("reason", &reason)]);
            }
        });

        self.shutdown = Some(shutdown);
        self.local_addr = Some(local_addr);
        let addr = local_addr.to_string();
        log_event_with_fields(Event::Serving, &[("name", self.name()), ("addr", &addr)]);
        Ok(())
    }

    fn close(&mut self) {
        let Some(shutdown) = self.shutdown.take() else {
            return;
        };
        let _ = shutdown.send(());
        self.local_addr = None;
        log_event_with_fields(Event::FrontDoorStopped, &[("name", self.name())]);
    }
}

impl Drop for AdminServer {
    fn drop(&mut self) {
        self.close();
    }
}

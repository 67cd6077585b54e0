use crate::routes::{AppState, handle_request};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A bound listener that has not started accepting yet.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    state: Arc<AppState>,
}

impl Server {
    /// Bind `addr`. Port 0 picks a free port; see [`Self::local_addr`].
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(addr: SocketAddr, state: AppState) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            state: Arc::new(state),
        })
    }

    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` resolves. Connections already
    /// being served finish on their own tasks.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) {
        let addr = self.listener.local_addr().ok();
        info!(?addr, "ember listening");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("shutting down listener");
                    return;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req| {
                                let state = Arc::clone(&state);
                                async move { handle_request(state, peer, req).await }
                            });

                            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                                debug!(%peer, error = %err, "connection closed with error");
                            }
                        });
                    }
                    Err(err) => {
                        error!(error = %err, "failed to accept connection");
                    }
                }
            }
        }
    }

    /// Accept connections forever.
    pub async fn run(self) {
        self.run_until(std::future::pending()).await;
    }
}

/// Sweep expired state every `interval` on a blocking worker.
pub fn spawn_sweeper(state: &AppState, interval: Duration) -> JoinHandle<()> {
    let service = Arc::clone(&state.service);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let service = Arc::clone(&service);
            match tokio::task::spawn_blocking(move || service.sweep()).await {
                Ok(Ok(report)) => debug!(?report, "periodic sweep finished"),
                Ok(Err(err)) => warn!(error = %err, code = %err.code(), "periodic sweep failed"),
                Err(err) => error!(error = %err, "sweep worker panicked"),
            }
        }
    })
}

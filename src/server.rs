//! Static file serving for the application under test.
//!
//! The verification run serves its working directory over plain HTTP. The
//! server itself is a small axum router around `ServeDir`; a run normally
//! launches it as a separate `gst-verify serve` child process so that it
//! lives and dies independently of the browser session.

use std::io::Read;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::errors::{VerifyError, VerifyResult};
use crate::process::{self, ManagedChild};

pub fn router(root: &Path) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(root))
        .layer(TraceLayer::new_for_http())
}

/// In-process static server running on a tokio task
pub struct StaticServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl StaticServer {
    pub async fn start(root: &Path, addr: SocketAddr) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .context(format!("Failed to bind {}", addr))?;
        let addr = listener.local_addr()?;
        let app = router(root);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        info!("Serving {} on http://{}", root.display(), addr);

        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!("Static server stopped with error: {}", e);
            }
        });

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        debug!("Static server on {} stopped", self.addr);
    }
}

impl Drop for StaticServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Serve `root` on `port` until Ctrl-C. With `watch_stdin`, also stop
/// when stdin reaches EOF, which happens when the parent run goes away.
pub async fn serve(root: &Path, port: u16, watch_stdin: bool) -> Result<()> {
    let server = StaticServer::start(root, SocketAddr::from(([127, 0, 0, 1], port))).await?;

    let parent_gone = async {
        if watch_stdin {
            stdin_closed().await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
        }
        _ = parent_gone => {
            info!("Parent closed stdin, stopping static server");
        }
    }

    server.shutdown().await;
    Ok(())
}

/// Resolves once stdin hits EOF or fails. The blocking read lives on its
/// own thread so it never holds up runtime shutdown.
async fn stdin_closed() {
    let (tx, rx) = oneshot::channel::<()>();
    std::thread::spawn(move || {
        let mut buf = [0u8; 256];
        let mut stdin = std::io::stdin().lock();
        loop {
            match stdin.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            }
        }
        let _ = tx.send(());
    });
    let _ = rx.await;
}

/// The static server running as a detached child process
pub struct StaticServerProcess {
    child: ManagedChild,
}

impl StaticServerProcess {
    /// Launch `program serve --root <root> --port <port>` and wait until it
    /// answers HTTP requests. The child's stdin is a pipe held open by this
    /// handle; it exits on its own if this process dies without stopping it.
    pub async fn spawn(
        program: &Path,
        root: &Path,
        port: u16,
        startup_timeout: Duration,
    ) -> VerifyResult<Self> {
        if process::is_port_in_use(port) {
            return Err(VerifyError::ServerStart(format!(
                "port {} is already in use",
                port
            )));
        }

        let mut cmd = Command::new(program);
        cmd.arg("serve")
            .arg("--root")
            .arg(root)
            .arg("--port")
            .arg(port.to_string())
            .arg("--watch-stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let child = ManagedChild::spawn("static server", cmd)
            .map_err(|e| VerifyError::ServerStart(format!("{e:#}")))?;
        let mut server = Self { child };

        // Check the address the child binds, not whatever `localhost` resolves to
        let url = format!("http://127.0.0.1:{}/", port);
        let deadline = tokio::time::Instant::now() + startup_timeout;
        loop {
            if let Some(status) = server.child.try_exited() {
                return Err(VerifyError::ServerStart(format!(
                    "server process exited early with {}",
                    status
                )));
            }
            if process::wait_for_http(&url, Duration::ZERO).await {
                info!("Static server ready at {}", url);
                return Ok(server);
            }
            if tokio::time::Instant::now() >= deadline {
                server.stop().await;
                return Err(VerifyError::ServerStart(format!(
                    "no response from {} within {}ms",
                    url,
                    startup_timeout.as_millis()
                )));
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    pub async fn stop(&mut self) {
        self.child.shutdown(Duration::from_secs(2)).await;
    }
}

/// Where the served files live, resolved against the working directory
pub fn resolve_root(root: &Path) -> Result<PathBuf> {
    let root = if root.is_absolute() {
        root.to_path_buf()
    } else {
        std::env::current_dir()?.join(root)
    };
    if !root.is_dir() {
        anyhow::bail!("Serve root {} is not a directory", root.display());
    }
    Ok(root)
}

#[cfg(test)]
#[path = "server_test.rs"]
mod server_test;

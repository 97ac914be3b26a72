use std::process::{Child, Command};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info};

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A spawned child running in its own process group so the whole tree can
/// be signalled at once.
pub struct ManagedChild {
    name: String,
    child: Child,
    #[cfg(unix)]
    process_group_id: i32,
}

impl ManagedChild {
    /// Spawn `cmd` as the leader of a new process group
    pub fn spawn(name: &str, mut cmd: Command) -> Result<Self> {
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let child = cmd.spawn().context(format!("Failed to start {}", name))?;
        debug!("Started {} with pid {}", name, child.id());

        Ok(Self {
            name: name.to_string(),
            #[cfg(unix)]
            process_group_id: child.id() as i32,
            child,
        })
    }

    /// Returns the exit status if the child has already exited
    pub fn try_exited(&mut self) -> Option<std::process::ExitStatus> {
        self.child.try_wait().ok().flatten()
    }

    /// SIGTERM the group, give it `grace` to exit, then SIGKILL.
    /// Blocks the calling thread; use [`ManagedChild::shutdown`] from async code.
    pub fn terminate(&mut self, grace: Duration) {
        if !self.request_stop() {
            return;
        }
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if self.try_exited().is_some() {
                return;
            }
            std::thread::sleep(STOP_POLL_INTERVAL);
        }
        self.force_stop();
    }

    /// Same as [`ManagedChild::terminate`] but waits on the tokio timer
    pub async fn shutdown(&mut self, grace: Duration) {
        if !self.request_stop() {
            return;
        }
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if self.try_exited().is_some() {
                return;
            }
            tokio::time::sleep(STOP_POLL_INTERVAL).await;
        }
        self.force_stop();
    }

    /// Send SIGTERM to the group. Returns false if the child already exited.
    fn request_stop(&mut self) -> bool {
        if self.try_exited().is_some() {
            return false;
        }
        info!("Stopping {} (pid {})", self.name, self.child.id());

        #[cfg(unix)]
        signal_group(self.process_group_id, nix::sys::signal::Signal::SIGTERM);

        true
    }

    fn force_stop(&mut self) {
        #[cfg(unix)]
        signal_group(self.process_group_id, nix::sys::signal::Signal::SIGKILL);

        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for ManagedChild {
    fn drop(&mut self) {
        self.terminate(Duration::from_millis(500));
    }
}

#[cfg(unix)]
fn signal_group(pgid: i32, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    if let Err(e) = killpg(Pid::from_raw(pgid), signal) {
        debug!("Failed to send {} to process group {}: {}", signal, pgid, e);
    }
}

/// Check if a command exists in PATH
pub fn command_exists(command: &str) -> bool {
    #[cfg(unix)]
    let finder = "which";
    #[cfg(windows)]
    let finder = "where";

    Command::new(finder)
        .arg(command)
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Check if a local TCP port is taken on either loopback address.
/// Browsers may resolve `localhost` to `::1` first, so a listener there
/// would shadow a server bound to `127.0.0.1`.
pub fn is_port_in_use(port: u16) -> bool {
    if std::net::TcpListener::bind(("127.0.0.1", port)).is_err() {
        return true;
    }
    let v6 = std::net::SocketAddr::from((std::net::Ipv6Addr::LOCALHOST, port));
    std::net::TcpStream::connect_timeout(&v6, Duration::from_millis(200)).is_ok()
}

/// Let the OS pick a free port
pub fn free_port() -> Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

/// Listen for SIGINT and SIGTERM. Handlers are registered before this
/// returns; the future resolves with the signal's name.
#[cfg(unix)]
pub fn shutdown_signal() -> std::io::Result<impl std::future::Future<Output = &'static str>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
        }
    })
}

#[cfg(not(unix))]
pub fn shutdown_signal() -> std::io::Result<impl std::future::Future<Output = &'static str>> {
    Ok(async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        "Ctrl-C"
    })
}

/// Poll `url` until it answers any HTTP response or `timeout` elapses
pub async fn wait_for_http(url: &str, timeout: Duration) -> bool {
    let client = reqwest::Client::new();
    let deadline = Instant::now() + timeout;

    loop {
        match client
            .get(url)
            .timeout(Duration::from_secs(1))
            .send()
            .await
        {
            Ok(response) => {
                debug!("{} answered with {}", url, response.status());
                return true;
            }
            Err(e) => debug!("{} not ready yet: {}", url, e),
        }

        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[cfg(test)]
#[path = "process_test.rs"]
mod process_test;

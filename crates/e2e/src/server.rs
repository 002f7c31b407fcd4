//! Server management - spawning and health checking the web server

use inplace_common::Locale;
use inplace_web::WebConfig;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};

/// Handle to a running server process
pub struct ServerHandle {
    child: Child,
    pub base_url: String,
    pub port: u16,
    /// Scratch directory holding the server's config (and database), removed on drop
    _data_dir: TempDir,
}

impl ServerHandle {
    /// Spawn the inplace-web server
    pub async fn spawn(config: ServerConfig) -> E2eResult<Self> {
        let port = match config.port {
            Some(port) => port,
            None => find_free_port()?,
        };
        let base_url = format!("http://127.0.0.1:{}", port);

        let data_dir = tempfile::tempdir()?;
        let web_config = WebConfig {
            listen: ([127, 0, 0, 1], port).into(),
            db_path: config
                .db_path
                .clone()
                .unwrap_or_else(|| data_dir.path().join("state.db")),
            default_locale: Locale::parse(&config.default_locale)?,
            // Fixture seeding is only routed in test mode
            test_mode: config.test_mode,
        };
        let config_path = data_dir.path().join("web.toml");
        web_config
            .save(&config_path)
            .map_err(|e| E2eError::ServerStartup(format!("failed to write server config: {}", e)))?;

        info!("Spawning web server on port {}", port);

        let mut cmd = Command::new(&config.binary_path);

        // The written file is the whole configuration; drop inherited overrides
        cmd.env("INPLACE_CONFIG", &config_path)
            .env_remove("INPLACE_WEB_ADDR")
            .env_remove("INPLACE_DB_PATH")
            .env_remove("INPLACE_DEFAULT_LOCALE")
            .env_remove("INPLACE_E2E_TEST_MODE");

        cmd.stdout(Stdio::null()).stderr(if config.show_logs {
            Stdio::inherit()
        } else {
            Stdio::null()
        });

        let child = cmd.spawn().map_err(|e| {
            E2eError::ServerStartup(format!(
                "Failed to spawn {}: {}",
                config.binary_path.display(),
                e
            ))
        })?;

        let mut handle = ServerHandle {
            child,
            base_url: base_url.clone(),
            port,
            _data_dir: data_dir,
        };

        // Wait for server to be healthy
        handle.wait_for_healthy(config.startup_timeout).await?;

        info!("Server is healthy at {}", base_url);
        Ok(handle)
    }

    /// Wait for the server to respond to health checks
    async fn wait_for_healthy(&mut self, timeout_duration: Duration) -> E2eResult<()> {
        let health_url = format!("{}/health", self.base_url);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = std::time::Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout_duration {
            attempts += 1;

            if let Some(status) = self.child.try_wait()? {
                return Err(E2eError::ServerStartup(format!("server exited early ({})", status)));
            }

            match client.get(&health_url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return Ok(());
                }
                Ok(resp) => {
                    warn!("Health check returned {}", resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for server to start...");
                    }
                    // Connection refused is expected while server is starting
                    if !e.is_connect() {
                        warn!("Health check error: {}", e);
                    }
                }
            }

            sleep(Duration::from_millis(100)).await;
        }

        Err(E2eError::ServerHealthCheck(attempts))
    }

    /// Get the base URL for this server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Stop the server
    pub fn stop(&mut self) -> E2eResult<()> {
        info!("Stopping server (pid: {})", self.child.id());

        // Try graceful shutdown first
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(self.child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                // Give it a moment to shut down gracefully
                std::thread::sleep(Duration::from_millis(500));
            }
        }

        // Force kill if still running
        let _ = self.child.kill();
        let _ = self.child.wait();

        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Configuration for spawning a server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path to the inplace-web binary
    pub binary_path: PathBuf,

    /// Database file; `None` uses a scratch directory
    pub db_path: Option<PathBuf>,

    /// Locale for requests without Accept-Language
    pub default_locale: String,

    /// Port to listen on (None = find free port)
    pub port: Option<u16>,

    /// Timeout for server startup
    pub startup_timeout: Duration,

    /// Expose the fixture endpoint
    pub test_mode: bool,

    /// Forward the server's stderr
    pub show_logs: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from("target/debug/inplace-web"),
            db_path: None,
            default_locale: "en".to_string(),
            port: None,
            startup_timeout: Duration::from_secs(30),
            test_mode: true,
            show_logs: false,
        }
    }
}

/// Find a free port to use
fn find_free_port() -> E2eResult<u16> {
    use std::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_free_port() {
        let port1 = find_free_port().unwrap();
        let port2 = find_free_port().unwrap();

        // Ports should be in valid range
        assert!(port1 > 1024);
        assert!(port2 > 1024);
    }

    #[tokio::test]
    async fn test_missing_binary_fails_to_start() {
        let config = ServerConfig {
            binary_path: PathBuf::from("/nonexistent/inplace-web"),
            ..ServerConfig::default()
        };
        assert!(matches!(
            ServerHandle::spawn(config).await,
            Err(E2eError::ServerStartup(_))
        ));
    }
}

//! Docker container host
//!
//! Drives the host's `docker` CLI: image pull, run, port lookup, in-container
//! SQL execution over stdin, log capture and teardown. SQL reaches the
//! container through `docker exec mysql` so no extra port wiring is needed
//! beyond the published 3306.

use crate::error::AppError;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};
use uuid::Uuid;

/// Sandbox container configuration
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    pub image: String,
    /// Host port to publish; `None` lets Docker pick a free one
    pub port: Option<u16>,
    pub root_password: String,
    pub database: String,
    pub charset: String,
    pub collation: String,
    pub timeout: Duration,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            image: "mysql:8.0".to_string(),
            port: None,
            root_password: Uuid::new_v4().simple().to_string(),
            database: "sandbox_db".to_string(),
            charset: "utf8mb4".to_string(),
            collation: "utf8mb4_unicode_ci".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

/// A running sandbox container
#[derive(Debug, Clone)]
pub struct Container {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub config: ContainerConfig,
}

impl Container {
    fn short_id(&self) -> &str {
        &self.id[..self.id.len().min(12)]
    }
}

/// Outcome of one in-container SQL execution
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub duration: Duration,
}

/// Wrapper around the host docker CLI
pub struct DockerHost;

impl DockerHost {
    pub fn new() -> Self {
        Self
    }

    /// Verify docker is installed and the daemon answers
    pub async fn check_available(&self) -> Result<(), AppError> {
        if which::which("docker").is_err() {
            return Err(AppError::Container(
                "docker is not installed or not on PATH".to_string(),
            ));
        }

        let output = self.run_docker(&["version", "--format", "{{.Server.Version}}"]).await?;
        if !output.status.success() {
            return Err(AppError::Container(format!(
                "docker daemon is not reachable: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }

    pub async fn pull_image(&self, image: &str) -> Result<(), AppError> {
        info!("pulling image {}", image);
        let output = self.run_docker(&["pull", image]).await?;
        if !output.status.success() {
            return Err(AppError::Container(format!(
                "failed to pull image {}: {}",
                image,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }

    /// Start a fresh MySQL container and resolve its published port
    pub async fn run_mysql(&self, config: ContainerConfig) -> Result<Container, AppError> {
        let name = format!("schemaforge_sandbox_{}", Uuid::new_v4().simple());

        let root_password_env = format!("MYSQL_ROOT_PASSWORD={}", config.root_password);
        let database_env = format!("MYSQL_DATABASE={}", config.database);
        let mut args: Vec<String> = vec![
            "run".into(),
            "-d".into(),
            "--name".into(),
            name.clone(),
            "-e".into(),
            root_password_env,
            "-e".into(),
            database_env,
        ];

        match config.port {
            Some(port) => {
                args.push("-p".into());
                args.push(format!("{port}:3306"));
            }
            None => {
                args.push("-p".into());
                args.push("3306".into());
            }
        }

        // Server flags must come after the image name
        args.push(config.image.clone());
        if !config.charset.is_empty() {
            args.push(format!("--character-set-server={}", config.charset));
        }
        if !config.collation.is_empty() {
            args.push(format!("--collation-server={}", config.collation));
        }

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        debug!("docker {}", args.join(" "));
        let output = self.run_docker(&arg_refs).await?;
        if !output.status.success() {
            return Err(AppError::Container(format!(
                "failed to start container: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();

        let port = match self.container_port(&id, 3306).await {
            Ok(port) => port,
            Err(e) => {
                let _ = self.remove(&id).await;
                return Err(e);
            }
        };

        let container = Container {
            id,
            name,
            host: "127.0.0.1".to_string(),
            port,
            config,
        };
        info!("sandbox container {} up on port {}", container.short_id(), port);

        Ok(container)
    }

    /// Resolve the host port mapped to an inner port
    pub async fn container_port(&self, id: &str, inner: u16) -> Result<u16, AppError> {
        let inner = inner.to_string();
        let output = self.run_docker(&["port", id, &inner]).await?;
        if !output.status.success() {
            return Err(AppError::Container(format!(
                "failed to look up container port: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        // Output looks like 0.0.0.0:32768 (possibly multiple lines)
        let text = String::from_utf8_lossy(&output.stdout);
        text.lines()
            .filter_map(|line| line.rsplit(':').next())
            .find_map(|p| p.trim().parse().ok())
            .ok_or_else(|| AppError::Container(format!("cannot parse container port from `{}`", text.trim())))
    }

    /// Poll until MySQL answers `mysqladmin ping`, at least 2 s between
    /// attempts, bounded by the container's configured timeout.
    pub async fn wait_ready(&self, container: &Container) -> Result<(), AppError> {
        info!("waiting for MySQL to become ready...");
        let deadline = Instant::now() + container.config.timeout;
        let password = format!("-p{}", container.config.root_password);

        loop {
            tokio::time::sleep(Duration::from_secs(2)).await;
            if Instant::now() > deadline {
                return Err(AppError::Container(format!(
                    "MySQL did not become ready within {:?}",
                    container.config.timeout
                )));
            }

            let output = self
                .run_docker(&[
                    "exec",
                    &container.id,
                    "mysqladmin",
                    "ping",
                    "-h",
                    "localhost",
                    "-u",
                    "root",
                    &password,
                ])
                .await?;
            if output.status.success() {
                info!("MySQL is ready");
                return Ok(());
            }
        }
    }

    /// Execute a SQL batch inside the container via the mysql client
    pub async fn exec_sql(&self, container: &Container, sql: &str) -> Result<ExecOutcome, AppError> {
        self.exec_mysql_client(container, sql, None).await
    }

    /// Execute with a custom statement delimiter. Routine and trigger bodies
    /// contain internal `;` and are transmitted under e.g. `$$`.
    pub async fn exec_sql_delimited(
        &self,
        container: &Container,
        sql: &str,
        delimiter: &str,
    ) -> Result<ExecOutcome, AppError> {
        self.exec_mysql_client(container, sql, Some(delimiter)).await
    }

    async fn exec_mysql_client(
        &self,
        container: &Container,
        sql: &str,
        delimiter: Option<&str>,
    ) -> Result<ExecOutcome, AppError> {
        let start = Instant::now();
        let password = format!("-p{}", container.config.root_password);

        let mut cmd = Command::new("docker");
        cmd.arg("exec")
            .arg("-i")
            .arg(&container.id)
            .arg("mysql")
            .arg("-u")
            .arg("root")
            .arg(&password);
        if let Some(delimiter) = delimiter {
            cmd.arg(format!("--delimiter={delimiter}"));
        }
        cmd.arg(&container.config.database);

        cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| AppError::Container(format!("failed to spawn mysql client: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(sql.as_bytes())
                .await
                .map_err(|e| AppError::Container(format!("failed to stream SQL: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| AppError::Container(format!("mysql client did not exit cleanly: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let success = output.status.success();

        Ok(ExecOutcome {
            success,
            error: if success {
                None
            } else if stderr.contains("ERROR") {
                Some(stderr.trim().to_string())
            } else {
                Some(format!("mysql exited with {}: {}", output.status, stderr.trim()))
            },
            output: stdout,
            duration: start.elapsed(),
        })
    }

    /// Last `tail` lines of the container log
    pub async fn logs(&self, id: &str, tail: usize) -> Result<String, AppError> {
        let tail = tail.to_string();
        let output = self.run_docker(&["logs", "--tail", &tail, id]).await?;
        // docker logs writes the MySQL server log to stderr
        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text)
    }

    pub async fn stop(&self, id: &str) -> Result<(), AppError> {
        let output = self.run_docker(&["stop", id]).await?;
        if !output.status.success() {
            return Err(AppError::Container(format!(
                "failed to stop container: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }

    /// Stop (best effort) and force-remove the container
    pub async fn remove(&self, id: &str) -> Result<(), AppError> {
        let _ = self.stop(id).await;
        let output = self.run_docker(&["rm", "-f", id]).await?;
        if !output.status.success() {
            return Err(AppError::Container(format!(
                "failed to remove container: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        debug!("container {} removed", &id[..id.len().min(12)]);
        Ok(())
    }

    async fn run_docker(&self, args: &[&str]) -> Result<std::process::Output, AppError> {
        Command::new("docker")
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| AppError::Container(format!("docker command failed: {e}")))
    }
}

impl Default for DockerHost {
    fn default() -> Self {
        Self::new()
    }
}

//! Test server management.
//!
//! Runs idmd in-process on an ephemeral port with a config file written to
//! a temporary directory.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use idmd::config::{Config, validate};
use idmd::state::{self, AppState, SharedState};
use idmd::store::Identity;
use tokio::sync::oneshot;

/// A test server instance.
pub struct TestServer {
    pub state: SharedState,
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    _dir: tempfile::TempDir,
}

impl TestServer {
    /// Spawn a server with an admin (`admin`/`password`) and the given
    /// extra TOML appended to the config.
    pub async fn spawn(extra: &str) -> anyhow::Result<Self> {
        Self::spawn_with_discharge(extra, "wait_timeout = 5\nticket_lifetime = 60").await
    }

    /// Spawn a server with custom `[discharge]` settings.
    pub async fn spawn_with_discharge(extra: &str, discharge: &str) -> anyhow::Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let dir = tempfile::tempdir()?;
        let config_path = dir.path().join("idmd.toml");
        let config_content = format!(
            r#"
[server]
location = "http://{addr}/"
listen = "{addr}"
metrics_port = 0

[keys]
private_key = "{private_key}"
root_key = "{root_key}"

[admin]
password = "password"

[discharge]
{discharge}

{extra}
"#,
            private_key = STANDARD.encode([7u8; 32]),
            root_key = STANDARD.encode([9u8; 32]),
        );
        std::fs::write(&config_path, config_content)?;

        let config = Config::load(&config_path)?;
        if let Err(errors) = validate(&config) {
            anyhow::bail!("invalid test config: {errors:?}");
        }
        let store = state::open_store(&config).await?;
        let state = Arc::new(AppState::new(&config, store)?);

        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(idmd::http::serve(listener, Arc::clone(&state), async {
            let _ = rx.await;
        }));

        Ok(Self {
            state,
            addr,
            shutdown: Some(tx),
            _dir: dir,
        })
    }

    /// Absolute URL of `path` on this server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Location third-party caveats are addressed to.
    pub fn location(&self) -> &str {
        &self.state.location
    }

    /// Store an identity directly.
    pub async fn add_identity(&self, username: &str, groups: &[&str]) -> Identity {
        let identity = Identity {
            provider_id: format!("test:{username}"),
            username: username.to_string(),
            groups: groups.iter().map(|g| g.to_string()).collect(),
            ..Default::default()
        };
        self.state
            .store
            .upsert_identity(&identity)
            .await
            .expect("upsert test identity")
    }

    /// Fetch a stored identity by username.
    pub async fn identity(&self, username: &str) -> Option<Identity> {
        self.state
            .store
            .identity(idmd::store::IdentityKey::Username(username))
            .await
            .expect("identity lookup")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

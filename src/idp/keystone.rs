//! OpenStack Keystone identity providers.
//!
//! Both providers authenticate against Keystone v3 (`POST /v3/auth/tokens`)
//! and read the user's groups from `/v3/users/<id>/groups`. User names,
//! IDs and groups are qualified with the provider's domain.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{Instrument, debug};

use super::static_users::login_form;
use super::{IdentityProvider, IdpContext, IdpRequest, qualify};
use crate::config::KeystoneConfig;
use crate::error::DischargeError;
use crate::store::Identity;
use crate::telemetry::spans;

const SUBJECT_TOKEN: &str = "X-Subject-Token";
const AUTH_TOKEN: &str = "X-Auth-Token";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum KeystoneError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),
    #[error("keystone returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("keystone response has no X-Subject-Token header")]
    MissingToken,
}

#[derive(Serialize)]
struct AuthRequest<'a> {
    auth: Auth<'a>,
}

#[derive(Serialize)]
struct Auth<'a> {
    identity: AuthIdentity<'a>,
}

#[derive(Serialize)]
struct AuthIdentity<'a> {
    methods: [&'a str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<PasswordMethod<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<TokenMethod<'a>>,
}

#[derive(Serialize)]
struct PasswordMethod<'a> {
    user: PasswordUser<'a>,
}

#[derive(Serialize)]
struct PasswordUser<'a> {
    name: &'a str,
    domain: NamedDomain<'a>,
    password: &'a str,
}

#[derive(Serialize)]
struct NamedDomain<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct TokenMethod<'a> {
    id: &'a str,
}

impl<'a> AuthRequest<'a> {
    fn password(username: &'a str, password: &'a str) -> Self {
        Self {
            auth: Auth {
                identity: AuthIdentity {
                    methods: ["password"],
                    password: Some(PasswordMethod {
                        user: PasswordUser {
                            name: username,
                            domain: NamedDomain { name: "Default" },
                            password,
                        },
                    }),
                    token: None,
                },
            },
        }
    }

    fn token(id: &'a str) -> Self {
        Self {
            auth: Auth {
                identity: AuthIdentity {
                    methods: ["token"],
                    password: None,
                    token: Some(TokenMethod { id }),
                },
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: TokenBody,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    user: KeystoneUser,
}

#[derive(Debug, Clone, Deserialize)]
struct KeystoneUser {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct GroupsResponse {
    groups: Vec<KeystoneGroup>,
}

#[derive(Debug, Deserialize)]
struct KeystoneGroup {
    name: String,
}

/// `{"Token": {"login": {"id": ...}}}` body accepted by the token provider.
#[derive(Debug, Deserialize)]
pub struct TokenLoginRequest {
    #[serde(rename = "Token")]
    pub token: TokenLogin,
}

#[derive(Debug, Deserialize)]
pub struct TokenLogin {
    pub login: TokenId,
}

#[derive(Debug, Deserialize)]
pub struct TokenId {
    pub id: String,
}

/// Keystone v3 client shared by both providers.
struct KeystoneClient {
    config: KeystoneConfig,
    http: reqwest::Client,
}

impl KeystoneClient {
    fn new(config: KeystoneConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.url.trim_end_matches('/'))
    }

    async fn authenticate(&self, body: &AuthRequest<'_>) -> Result<(String, KeystoneUser), KeystoneError> {
        let resp = self
            .http
            .post(self.endpoint("/v3/auth/tokens"))
            .json(body)
            .send()
            .await?;
        let resp = check_status(resp).await?;
        let token = resp
            .headers()
            .get(SUBJECT_TOKEN)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or(KeystoneError::MissingToken)?;
        let body: TokenResponse = resp.json().await?;
        Ok((token, body.token.user))
    }

    async fn groups(&self, token: &str, user_id: &str) -> Result<Vec<String>, KeystoneError> {
        let resp = self
            .http
            .get(self.endpoint(&format!("/v3/users/{user_id}/groups")))
            .header(AUTH_TOKEN, token)
            .send()
            .await?;
        let body: GroupsResponse = check_status(resp).await?.json().await?;
        Ok(body.groups.into_iter().map(|g| g.name).collect())
    }

    /// Authenticate and build the qualified identity.
    async fn login(&self, body: &AuthRequest<'_>) -> Result<Identity, KeystoneError> {
        let (token, user) = self.authenticate(body).await?;
        let groups = self.groups(&token, &user.id).await?;
        let domain = self.config.domain.as_deref();
        debug!(user_id = %user.id, groups = groups.len(), "Keystone login");
        Ok(Identity {
            provider_id: format!("{}:{}", self.config.name, qualify(&user.id, domain)),
            username: qualify(&user.name, domain),
            groups: groups.iter().map(|g| qualify(g, domain)).collect(),
            ..Default::default()
        })
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, KeystoneError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(KeystoneError::Status {
        status: status.as_u16(),
        message: message.trim().to_string(),
    })
}

/// Interactive username/password login against Keystone.
pub struct KeystoneProvider {
    client: KeystoneClient,
}

impl KeystoneProvider {
    pub fn new(config: KeystoneConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: KeystoneClient::new(config)?,
        })
    }
}

#[async_trait]
impl IdentityProvider for KeystoneProvider {
    fn name(&self) -> &str {
        &self.client.config.name
    }

    fn description(&self) -> &str {
        &self.client.config.description
    }

    fn domain(&self) -> Option<&str> {
        self.client.config.domain.as_deref()
    }

    fn interactive(&self) -> bool {
        true
    }

    async fn handle(&self, ctx: IdpContext, req: IdpRequest) -> Response {
        let span = spans::login(self.name(), ctx.waitid());
        async {
            if req.method != Method::POST {
                return login_form(ctx.login_url(), None, StatusCode::OK);
            }
            let form = req.form();
            let username = form.get("username").map(String::as_str).unwrap_or("");
            let password = form.get("password").map(String::as_str).unwrap_or("");
            let identity = match self
                .client
                .login(&AuthRequest::password(username, password))
                .await
            {
                Ok(identity) => identity,
                Err(e) => {
                    let message = format!("cannot log in: {e}");
                    return login_form(ctx.login_url(), Some(&message), StatusCode::UNAUTHORIZED);
                }
            };
            match ctx.login_success(identity).await {
                Ok(identity) => (
                    [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                    format!("login successful as user {}\n", identity.username),
                )
                    .into_response(),
                Err(e) => e.into_response(),
            }
        }
        .instrument(span)
        .await
    }
}

/// Non-interactive login with an existing Keystone token.
pub struct KeystoneTokenProvider {
    client: KeystoneClient,
}

impl KeystoneTokenProvider {
    pub fn new(config: KeystoneConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: KeystoneClient::new(config)?,
        })
    }
}

#[async_trait]
impl IdentityProvider for KeystoneTokenProvider {
    fn name(&self) -> &str {
        &self.client.config.name
    }

    fn description(&self) -> &str {
        &self.client.config.description
    }

    fn domain(&self) -> Option<&str> {
        self.client.config.domain.as_deref()
    }

    fn interactive(&self) -> bool {
        false
    }

    async fn handle(&self, ctx: IdpContext, req: IdpRequest) -> Response {
        let span = spans::login(self.name(), ctx.waitid());
        async {
            if req.method != Method::POST {
                return StatusCode::METHOD_NOT_ALLOWED.into_response();
            }
            let login: TokenLoginRequest = match serde_json::from_slice(&req.body) {
                Ok(login) => login,
                Err(e) => {
                    let message = format!("cannot unmarshal login request: {e}");
                    ctx.login_failure(message.clone());
                    return DischargeError::BadRequest(message).into_response();
                }
            };
            let identity = match self
                .client
                .login(&AuthRequest::token(&login.token.login.id))
                .await
            {
                Ok(identity) => identity,
                Err(e) => {
                    let message = format!("cannot log in: {e}");
                    ctx.login_failure(message.clone());
                    return DischargeError::LoginFailed(message).into_response();
                }
            };
            if let Err(e) = ctx.login_success(identity).await {
                return e.into_response();
            }
            ctx.discharge_response(&req.headers).await
        }
        .instrument(span)
        .await
    }
}

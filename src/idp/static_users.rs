//! Users configured inline, logged in through an HTML form.

use async_trait::async_trait;
use axum::http::{Method, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use tracing::Instrument;

use super::{IdentityProvider, IdpContext, IdpRequest, html_escape, qualify};
use crate::config::{StaticProviderConfig, StaticUser, verify_password};
use crate::store::Identity;
use crate::telemetry::spans;

pub struct StaticProvider {
    config: StaticProviderConfig,
}

impl StaticProvider {
    pub fn new(config: StaticProviderConfig) -> Self {
        Self { config }
    }

    fn user(&self, username: &str, password: &str) -> Option<&StaticUser> {
        self.config
            .users
            .iter()
            .find(|u| u.username == username)
            .filter(|u| verify_password(password, &u.password))
    }

    fn identity(&self, user: &StaticUser) -> Identity {
        Identity {
            provider_id: format!("{}:{}", self.config.name, user.username),
            username: qualify(&user.username, self.config.domain.as_deref()),
            name: user.name.clone(),
            email: user.email.clone(),
            groups: user.groups.clone(),
            last_discharge: None,
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn description(&self) -> &str {
        &self.config.description
    }

    fn domain(&self) -> Option<&str> {
        self.config.domain.as_deref()
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
            let Some(user) = self.user(username, password) else {
                // The user may try again; the ticket stays pending.
                return login_form(
                    ctx.login_url(),
                    Some("invalid username or password"),
                    StatusCode::UNAUTHORIZED,
                );
            };
            match ctx.login_success(self.identity(user)).await {
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

/// Render the username/password form posting back to `action`.
pub(crate) fn login_form(action: &str, error: Option<&str>, status: StatusCode) -> Response {
    let error = error
        .map(|e| format!("<p class=\"error\">{}</p>\n", html_escape(e)))
        .unwrap_or_default();
    let body = format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Log in</title></head>\n<body>\n{error}\
         <form method=\"POST\" action=\"{}\">\n\
         <p><label>Username <input type=\"text\" name=\"username\"></label></p>\n\
         <p><label>Password <input type=\"password\" name=\"password\"></label></p>\n\
         <p><input type=\"submit\" value=\"Log in\"></p>\n\
         </form>\n</body>\n</html>\n",
        html_escape(action)
    );
    (status, Html(body)).into_response()
}

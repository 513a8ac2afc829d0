//! Test relying party.
//!
//! Seals third-party caveats to the test server and drives the discharge
//! protocol over HTTP.

#![allow(dead_code)]

use std::collections::HashMap;

use bakery_proto::{CheckContext, KeyPair, Macaroon, ThirdPartyCaveat, decode_slice};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use reqwest::header::{CONTENT_TYPE, HeaderMap, SET_COOKIE};
use serde_json::Value;

use super::server::TestServer;

const PRIMARY_ROOT_KEY: &[u8] = b"relying-party-root-key";

/// A sealed caveat and the root key its discharge is minted with.
pub struct TestCaveat {
    pub root_key: Vec<u8>,
    pub id: Vec<u8>,
}

impl TestCaveat {
    pub fn id64(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.id)
    }
}

/// A relying party talking to a test server.
pub struct TestClient {
    pub http: reqwest::Client,
    key: KeyPair,
    base: String,
    location: String,
    idm_key: bakery_proto::PublicKey,
}

impl TestClient {
    pub fn new(server: &TestServer) -> Self {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("build http client");
        Self {
            http,
            key: KeyPair::generate(),
            base: server.url(""),
            location: server.location().to_string(),
            idm_key: server.state.key.public_key(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Seal `condition` to the discharger.
    pub fn caveat(&self, condition: &str) -> TestCaveat {
        let root_key = rand::random::<[u8; 24]>().to_vec();
        let id = ThirdPartyCaveat::seal(&self.key, &self.idm_key, &root_key, condition)
            .expect("seal caveat");
        TestCaveat { root_key, id }
    }

    /// Start a discharge request for `caveat`.
    pub fn discharge_request(&self, caveat: &TestCaveat) -> reqwest::RequestBuilder {
        self.discharge_request_with(caveat, &[])
    }

    /// Start a discharge request with extra form fields.
    pub fn discharge_request_with(
        &self,
        caveat: &TestCaveat,
        fields: &[(&str, &str)],
    ) -> reqwest::RequestBuilder {
        let mut form = vec![("id64", caveat.id64())];
        form.extend(fields.iter().map(|(k, v)| (*k, v.to_string())));
        self.post_form(&self.url("/discharge"), &form)
    }

    /// POST an urlencoded form.
    pub fn post_form<V: AsRef<str>>(&self, url: &str, fields: &[(&str, V)]) -> reqwest::RequestBuilder {
        let mut body = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in fields {
            body.append_pair(k, v.as_ref());
        }
        self.http
            .post(url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body.finish())
    }

    /// Admin discharge on behalf of `username`.
    pub fn discharge_for_user(&self, caveat: &TestCaveat, username: &str) -> reqwest::RequestBuilder {
        self.discharge_request_with(caveat, &[("discharge-for-user", username)])
            .basic_auth("admin", Some("password"))
    }

    /// Check `discharge` against a primary macaroon holding `caveat`.
    pub fn verify(&self, caveat: &TestCaveat, discharge: &Value) -> Result<(), String> {
        let mut discharge: Macaroon =
            serde_json::from_value(discharge.clone()).map_err(|e| e.to_string())?;
        let mut primary = Macaroon::new(PRIMARY_ROOT_KEY, b"primary".to_vec(), "relying-party");
        primary
            .add_third_party_caveat(&caveat.root_key, caveat.id.clone(), self.location.clone())
            .map_err(|e| e.to_string())?;
        primary.bind_for_request(&mut discharge);
        let ctx = CheckContext {
            now: Utc::now(),
            origin: None,
            op: None,
        };
        primary
            .verify(PRIMARY_ROOT_KEY, |c| ctx.check(c), &[discharge])
            .map_err(|e| e.to_string())
    }
}

/// Decode a JSON response body.
pub async fn json(resp: reqwest::Response) -> Value {
    resp.json().await.expect("json body")
}

/// Values of the named cookie set by a response.
pub fn set_cookies(headers: &HeaderMap, name: &str) -> Vec<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| {
            let (pair, _) = v.split_once(';').unwrap_or((v, ""));
            let (k, value) = pair.split_once('=')?;
            (k == name).then(|| value.to_string())
        })
        .collect()
}

/// Full Set-Cookie header lines for the named cookie.
pub fn set_cookie_lines(headers: &HeaderMap, name: &str) -> Vec<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter(|v| v.starts_with(&format!("{name}=")))
        .map(str::to_string)
        .collect()
}

/// Decode a `macaroon-identity` cookie value.
pub fn session_macaroons(cookie: &str) -> Vec<Macaroon> {
    decode_slice(cookie).expect("decode session cookie")
}

/// Query parameters of a URL.
pub fn query(url: &str) -> HashMap<String, String> {
    url::Url::parse(url)
        .expect("parse url")
        .query_pairs()
        .into_owned()
        .collect()
}

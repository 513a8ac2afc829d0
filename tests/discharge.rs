//! Integration tests for the discharge endpoint: admin discharges,
//! condition evaluation, and protocol-version dependent responses.

mod common;

use bakery_proto::{Macaroon, infer_declared};
use common::client::{json, session_macaroons, set_cookies};
use common::{TestClient, TestServer};
use reqwest::StatusCode;

#[tokio::test]
async fn test_discharge_for_user() {
    let server = TestServer::spawn("").await.expect("Failed to spawn test server");
    server.add_identity("jbloggs", &[]).await;
    server.add_identity("jbloggs@test", &[]).await;
    let client = TestClient::new(&server);

    struct Case {
        condition: &'static str,
        user: &'static str,
        error: Option<&'static str>,
    }
    let cases = [
        Case {
            condition: "is-authenticated-user",
            user: "jbloggs",
            error: None,
        },
        Case {
            condition: "is-authenticated-user",
            user: "jbloggs2",
            error: Some(r#"cannot discharge: invalid username "jbloggs2": user jbloggs2 not found"#),
        },
        Case {
            condition: "is-authenticated-user @test",
            user: "jbloggs@test",
            error: None,
        },
        Case {
            condition: "is-authenticated-user @test2",
            user: "jbloggs@test",
            error: Some(
                r#"cannot discharge: invalid username "jbloggs@test": "jbloggs@test" not in required domain "test2""#,
            ),
        },
    ];

    for case in cases {
        let caveat = client.caveat(case.condition);
        let resp = client
            .discharge_for_user(&caveat, case.user)
            .send()
            .await
            .expect("discharge request");
        let status = resp.status();
        let cookies = set_cookies(resp.headers(), "macaroon-identity");
        let body = json(resp).await;
        match case.error {
            None => {
                assert_eq!(status, StatusCode::OK, "{}: {body}", case.condition);
                // Login ops start a session for the named user.
                assert_eq!(cookies.len(), 1, "{}", case.condition);
                let session = session_macaroons(&cookies[0]);
                assert_eq!(
                    body["DischargeToken"][0],
                    serde_json::to_value(&session[0]).unwrap()
                );
                let discharge: Macaroon = serde_json::from_value(body["Macaroon"].clone()).unwrap();
                assert_eq!(
                    infer_declared(&discharge).get("username").map(String::as_str),
                    Some(case.user)
                );
                client.verify(&caveat, &body["Macaroon"]).expect("discharge verifies");
            }
            Some(message) => {
                assert_eq!(status, StatusCode::FORBIDDEN, "{}", case.condition);
                assert_eq!(body["Message"], message);
            }
        }
    }
}

#[tokio::test]
async fn test_bad_credentials() {
    let server = TestServer::spawn("").await.expect("Failed to spawn test server");
    let client = TestClient::new(&server);
    let caveat = client.caveat("is-authenticated-user");

    let resp = client
        .discharge_request(&caveat)
        .basic_auth("admin", Some("wrong"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body = json(resp).await;
    assert_eq!(
        body["Message"],
        "cannot discharge: could not determine identity: invalid credentials"
    );
}

#[tokio::test]
async fn test_admin_discharges_as_itself() {
    let server = TestServer::spawn("").await.expect("Failed to spawn test server");
    let client = TestClient::new(&server);
    let caveat = client.caveat("is-authenticated-user");

    let resp = client
        .discharge_request(&caveat)
        .basic_auth("admin", Some("password"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get(reqwest::header::SET_COOKIE).is_none());
    let body = json(resp).await;
    assert!(body.get("DischargeToken").is_none());
    let discharge: Macaroon = serde_json::from_value(body["Macaroon"].clone()).unwrap();
    assert_eq!(
        infer_declared(&discharge).get("username").map(String::as_str),
        Some("admin@idm")
    );
}

#[tokio::test]
async fn test_discharge_member_of() {
    let server = TestServer::spawn("").await.expect("Failed to spawn test server");
    server.add_identity("test-user", &["test", "test2"]).await;
    let client = TestClient::new(&server);

    for condition in [
        "is-member-of test",
        "is-member-of test test2",
        "is-member-of test2 test4",
        "is-member-of test-user",
    ] {
        let caveat = client.caveat(condition);
        let resp = client.discharge_for_user(&caveat, "test-user").send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK, "{condition}");
        let body = json(resp).await;
        client.verify(&caveat, &body["Macaroon"]).expect("discharge verifies");
        let discharge: Macaroon = serde_json::from_value(body["Macaroon"].clone()).unwrap();
        assert!(infer_declared(&discharge).is_empty(), "{condition}");
    }

    for condition in ["is-member-of test1", "is-member-of test1 test3"] {
        let caveat = client.caveat(condition);
        let resp = client.discharge_for_user(&caveat, "test-user").send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{condition}");
        let body = json(resp).await;
        assert_eq!(
            body["Message"],
            "third party refused discharge: user is not a member of required groups"
        );
    }
}

#[tokio::test]
async fn test_discharge_x_member_of_x() {
    let server = TestServer::spawn("").await.expect("Failed to spawn test server");
    server.add_identity("test-user", &[]).await;
    let client = TestClient::new(&server);

    let caveat = client.caveat("is-member-of test-user");
    let resp = client.discharge_for_user(&caveat, "test-user").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let caveat = client.caveat("is-member-of other-user");
    let resp = client.discharge_for_user(&caveat, "test-user").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unrecognized_caveats() {
    let server = TestServer::spawn("").await.expect("Failed to spawn test server");
    let client = TestClient::new(&server);

    for (condition, message) in [
        ("is-something-else", "cannot discharge: caveat not recognized"),
        (
            "is-authenticated-user @test-",
            r#"cannot discharge: invalid domain "test-""#,
        ),
        (
            " is-authenticated-user",
            r#"cannot discharge: cannot parse caveat " is-authenticated-user": caveat starts with space character"#,
        ),
    ] {
        let caveat = client.caveat(condition);
        let resp = client
            .discharge_request(&caveat)
            .basic_auth("admin", Some("password"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{condition:?}");
        let body = json(resp).await;
        assert_eq!(body["Message"], message);
    }
}

#[tokio::test]
async fn test_missing_id() {
    let server = TestServer::spawn("").await.expect("Failed to spawn test server");
    let client = TestClient::new(&server);
    let resp = client
        .post_form(&client.url("/discharge"), &[("location", "nowhere")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(resp).await["Message"], "cannot discharge: missing id");
}

#[tokio::test]
async fn test_interaction_required_legacy_version() {
    let server = TestServer::spawn("").await.expect("Failed to spawn test server");
    let client = TestClient::new(&server);
    let caveat = client.caveat("is-authenticated-user");

    let resp = client.discharge_request(&caveat).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::PROXY_AUTHENTICATION_REQUIRED);
    assert!(resp.headers().get(reqwest::header::WWW_AUTHENTICATE).is_none());
    let body = json(resp).await;
    assert_eq!(body["Code"], "interaction required");
    assert_eq!(
        body["Message"],
        "macaroon discharge required: authentication required"
    );
    let visit = body["Info"]["VisitURL"].as_str().unwrap();
    let wait = body["Info"]["WaitURL"].as_str().unwrap();
    assert!(visit.starts_with(&client.url("/login?waitid=")), "{visit}");
    assert!(wait.starts_with(&client.url("/wait?waitid=")), "{wait}");
    assert_eq!(body["Info"]["InteractionMethods"]["interactive"], visit);
}

#[tokio::test]
async fn test_interaction_required_version_1() {
    let server = TestServer::spawn("").await.expect("Failed to spawn test server");
    let client = TestClient::new(&server);
    let caveat = client.caveat("is-authenticated-user");

    for version in ["1", "3"] {
        let resp = client
            .discharge_request(&caveat)
            .header("Bakery-Protocol-Version", version)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            resp.headers().get(reqwest::header::WWW_AUTHENTICATE).unwrap(),
            "Macaroon"
        );
    }
}

#[tokio::test]
async fn test_public_key() {
    let server = TestServer::spawn("").await.expect("Failed to spawn test server");
    let client = TestClient::new(&server);

    let resp = client.http.get(client.url("/publickey")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json(resp).await;
    assert_eq!(
        body["PublicKey"],
        server.state.key.public_key().to_string()
    );

    let resp = client.http.get(client.url("/discharge/info")).send().await.unwrap();
    let body = json(resp).await;
    assert_eq!(body["Version"], 3);
    assert_eq!(body["PublicKey"], server.state.key.public_key().to_string());
}

#[tokio::test]
async fn test_tampered_caveat() {
    let server = TestServer::spawn("").await.expect("Failed to spawn test server");
    let client = TestClient::new(&server);
    let mut caveat = client.caveat("is-authenticated-user");
    let last = caveat.id.len() - 1;
    caveat.id[last] ^= 0xff;

    let resp = client
        .discharge_request(&caveat)
        .basic_auth("admin", Some("password"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let message = json(resp).await["Message"].as_str().unwrap().to_string();
    assert!(message.starts_with("cannot discharge: cannot decode caveat"), "{message}");
}

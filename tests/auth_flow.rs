mod common;

use common::{str_field, Sidecar};
use serde_json::json;

#[test]
fn signup_login_and_token_checks() {
    let mut s = Sidecar::with_workspace("academate-auth-flow");

    let user = s.ok(
        "auth.signup",
        json!({
            "username": "ada",
            "fullName": "Ada Lovelace",
            "email": "Ada@Example.com",
            "password": "engine",
        }),
        None,
    );
    assert_eq!(str_field(&user, "username"), "ada");
    assert_eq!(str_field(&user, "email"), "ada@example.com");
    assert!(user.get("institution").map(|v| v.is_null()).unwrap_or(false));
    assert!(user.get("passwordHash").is_none());

    let dup_email = s.call(
        "auth.signup",
        json!({
            "username": "other",
            "fullName": "Other",
            "email": "ada@example.com",
            "password": "x",
        }),
        None,
    );
    assert_eq!(dup_email["error"]["code"], "conflict");
    assert_eq!(dup_email["error"]["message"], "Email already registered.");

    let dup_username = s.call(
        "auth.signup",
        json!({
            "username": "ada",
            "fullName": "Other",
            "email": "other@example.com",
            "password": "x",
        }),
        None,
    );
    assert_eq!(dup_username["error"]["code"], "conflict");
    assert_eq!(dup_username["error"]["message"], "Username already taken.");

    assert_eq!(
        s.err_code(
            "auth.signup",
            json!({ "username": "x", "fullName": "X", "email": "nope", "password": "x" }),
            None
        ),
        "bad_params"
    );

    assert_eq!(
        s.err_code(
            "auth.login",
            json!({ "email": "ada@example.com", "password": "wrong" }),
            None
        ),
        "unauthorized"
    );
    assert_eq!(
        s.err_code(
            "auth.login",
            json!({ "email": "nobody@example.com", "password": "engine" }),
            None
        ),
        "unauthorized"
    );

    let login = s.ok(
        "auth.login",
        json!({ "email": "ada@example.com", "password": "engine" }),
        None,
    );
    assert_eq!(str_field(&login, "tokenType"), "bearer");
    assert_eq!(str_field(&login["user"], "fullName"), "Ada Lovelace");
    let token = str_field(&login, "accessToken");

    let me = s.ok("auth.me", json!({}), Some(&token));
    assert_eq!(str_field(&me, "id"), str_field(&user, "id"));

    let bearer = format!("Bearer {}", token);
    assert!(s.ok("auth.me", json!({}), Some(&bearer)).is_object());

    assert_eq!(s.err_code("auth.me", json!({}), None), "unauthorized");
    assert_eq!(
        s.err_code("auth.me", json!({}), Some("v1.e30.AAAA")),
        "unauthorized"
    );
    let mut tampered = token.clone();
    tampered.push('x');
    assert_eq!(
        s.err_code("courses.list", json!({}), Some(&tampered)),
        "unauthorized"
    );
}

#[test]
fn tokens_do_not_outlive_the_signing_secret() {
    let ws = common::temp_dir("academate-auth-secret");
    let token = {
        let mut s = Sidecar::spawn();
        s.ok("workspace.select", json!({ "path": ws.to_string_lossy() }), None);
        let (_, token) = s.register("grace", "Grace Hopper");
        token
    };

    // Same secret, new process: the token still resolves.
    let mut s = Sidecar::spawn();
    s.ok("workspace.select", json!({ "path": ws.to_string_lossy() }), None);
    let me = s.ok("auth.me", json!({}), Some(&token));
    assert_eq!(str_field(&me, "username"), "grace");
}

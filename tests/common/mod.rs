#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    pub fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_academated");
        let mut child = Command::new(exe)
            .env_remove("ACADEMATE_WORKSPACE")
            .env("ACADEMATE_TOKEN_SECRET", "integration-test-secret")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn academated");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    /// Spawns and opens a fresh workspace.
    pub fn with_workspace(prefix: &str) -> Self {
        let mut s = Self::spawn();
        let ws = temp_dir(prefix);
        s.ok(
            "workspace.select",
            json!({ "path": ws.to_string_lossy() }),
            None,
        );
        s
    }

    pub fn write_line(&mut self, line: &str) -> serde_json::Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn call(
        &mut self,
        method: &str,
        params: serde_json::Value,
        token: Option<&str>,
    ) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let mut payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        if let Some(t) = token {
            payload["token"] = json!(t);
        }
        let value = self.write_line(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn ok(
        &mut self,
        method: &str,
        params: serde_json::Value,
        token: Option<&str>,
    ) -> serde_json::Value {
        let value = self.call(method, params, token);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error")
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    /// Expects a failure and returns its error code.
    pub fn err_code(
        &mut self,
        method: &str,
        params: serde_json::Value,
        token: Option<&str>,
    ) -> String {
        let value = self.call(method, params, token);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .expect("error code")
            .to_string()
    }

    /// Signs up and logs in; returns `(user_id, token)`.
    pub fn register(&mut self, username: &str, full_name: &str) -> (String, String) {
        let email = format!("{}@example.com", username);
        let user = self.ok(
            "auth.signup",
            json!({
                "username": username,
                "fullName": full_name,
                "email": email,
                "password": "correct horse",
                "institution": "Test University",
            }),
            None,
        );
        let login = self.ok(
            "auth.login",
            json!({ "email": email, "password": "correct horse" }),
            None,
        );
        let token = login
            .get("accessToken")
            .and_then(|v| v.as_str())
            .expect("accessToken")
            .to_string();
        let user_id = user
            .get("id")
            .and_then(|v| v.as_str())
            .expect("user id")
            .to_string();
        (user_id, token)
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn str_field(v: &serde_json::Value, key: &str) -> String {
    v.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing string field {} in {}", key, v))
        .to_string()
}

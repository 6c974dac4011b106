mod common;

use common::Sidecar;
use serde_json::json;

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let mut s = Sidecar::spawn();

    let health = s.ok("health", json!({}), None);
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());
    assert!(health.get("workspacePath").map(|v| v.is_null()).unwrap_or(false));

    assert_eq!(
        s.err_code(
            "auth.signup",
            json!({ "username": "a", "fullName": "A", "email": "a@b.co", "password": "p" }),
            None
        ),
        "no_workspace"
    );
    assert_eq!(s.err_code("workspace.select", json!({}), None), "bad_params");

    let ws = common::temp_dir("academate-router-smoke");
    s.ok("workspace.select", json!({ "path": ws.to_string_lossy() }), None);
    let (_, token) = s.register("smoke", "Smoke Test");

    for method in [
        "courses.list",
        "courses.count",
        "semesters.list",
        "semesters.cgpa",
        "studyGroups.list",
        "timetable.blocks.list",
    ] {
        s.ok(method, json!({}), Some(&token));
    }
    for method in [
        "studyGroups.get",
        "discussions.list",
        "resources.list",
        "groupTimetable.list",
    ] {
        assert_eq!(
            s.err_code(method, json!({ "groupId": "missing" }), Some(&token)),
            "not_found",
            "{}",
            method
        );
    }

    assert_eq!(
        s.err_code("grades.explode", json!({}), Some(&token)),
        "not_implemented"
    );

    let bad = s.write_line("{not json");
    assert_eq!(bad["ok"], false);
    assert_eq!(bad["error"]["code"], "bad_json");

    // The sidecar keeps serving after a bad line.
    s.ok("health", json!({}), None);
}

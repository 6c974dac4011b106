mod common;

use common::{str_field, Sidecar};
use serde_json::json;
use std::thread::sleep;
use std::time::Duration;

#[test]
fn discussions_require_membership_and_page_newest_first() {
    let mut s = Sidecar::with_workspace("academate-discussions");
    let (_, ada) = s.register("ada", "Ada Lovelace");
    let (_, bob) = s.register("bob", "Bob Builder");

    let group = s.ok("studyGroups.create", json!({ "name": "Public" }), Some(&ada));
    let group_id = str_field(&group, "id");

    assert_eq!(
        s.err_code(
            "discussions.create",
            json!({ "groupId": group_id, "content": "hi" }),
            Some(&bob)
        ),
        "forbidden"
    );
    assert_eq!(
        s.err_code(
            "discussions.create",
            json!({ "groupId": group_id, "content": "   " }),
            Some(&ada)
        ),
        "bad_params"
    );

    for i in 1..=5 {
        let msg = s.ok(
            "discussions.create",
            json!({ "groupId": group_id, "content": format!("message {}", i) }),
            Some(&ada),
        );
        assert_eq!(msg["userName"], "Ada Lovelace");
        assert_eq!(msg["userInitials"], "AL");
    }

    // Public group: non-members may read.
    let last_three = s.ok(
        "discussions.list",
        json!({ "groupId": group_id, "limit": 3 }),
        Some(&bob),
    );
    let contents: Vec<String> = last_three["messages"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .map(|m| str_field(m, "content"))
        .collect();
    assert_eq!(contents, vec!["message 3", "message 4", "message 5"]);

    let all = s.ok("discussions.list", json!({ "groupId": group_id }), Some(&bob));
    assert_eq!(all["messages"].as_array().map(|a| a.len()), Some(5));

    let private = s.ok(
        "studyGroups.create",
        json!({ "name": "Private", "isPrivate": true }),
        Some(&ada),
    );
    assert_eq!(
        s.err_code(
            "discussions.list",
            json!({ "groupId": str_field(&private, "id") }),
            Some(&bob)
        ),
        "forbidden"
    );
}

#[test]
fn resources_upload_list_and_download() {
    let mut s = Sidecar::with_workspace("academate-resources");
    let (ada_id, ada) = s.register("ada", "Ada Lovelace");
    let (_, bob) = s.register("bob", "Bob Builder");

    let group = s.ok("studyGroups.create", json!({ "name": "Notes" }), Some(&ada));
    let group_id = str_field(&group, "id");

    assert_eq!(
        s.err_code(
            "resources.upload",
            json!({ "groupId": group_id, "name": "x.txt", "fileContent": "aGk=" }),
            Some(&bob)
        ),
        "forbidden"
    );
    assert_eq!(
        s.err_code(
            "resources.upload",
            json!({ "groupId": group_id, "name": "x.txt", "fileContent": "%%%" }),
            Some(&ada)
        ),
        "bad_params"
    );

    let first = s.ok(
        "resources.upload",
        json!({
            "groupId": group_id,
            "name": "notes.txt",
            "fileType": "text/plain",
            "fileContent": "aGVsbG8gd29ybGQ=",
            "description": "week 1"
        }),
        Some(&ada),
    );
    let first_id = str_field(&first, "id");
    assert_eq!(first["size"], 11);
    assert_eq!(first["uploadedBy"], ada_id.as_str());
    assert_eq!(
        str_field(&first, "downloadUrl"),
        format!("/study-groups/{}/resources/{}/download", group_id, first_id)
    );

    let second = s.ok(
        "resources.upload",
        json!({ "groupId": group_id, "name": "blob.bin", "fileContent": "AAEC" }),
        Some(&ada),
    );
    assert_eq!(second["fileType"], "application/octet-stream");

    let listed = s.ok("resources.list", json!({ "groupId": group_id }), Some(&bob));
    let resources = listed["resources"].as_array().cloned().unwrap_or_default();
    assert_eq!(resources.len(), 2);
    assert_eq!(resources[0]["name"], "blob.bin");
    assert!(resources[0].get("contentBase64").is_none());

    let download = s.ok(
        "resources.download",
        json!({ "groupId": group_id, "resourceId": first_id }),
        Some(&bob),
    );
    assert_eq!(download["contentBase64"], "aGVsbG8gd29ybGQ=");
    assert_eq!(download["fileType"], "text/plain");
    assert_eq!(download["contentDisposition"], "attachment; filename=notes.txt");

    let other = s.ok("studyGroups.create", json!({ "name": "Other" }), Some(&ada));
    assert_eq!(
        s.err_code(
            "resources.download",
            json!({ "groupId": str_field(&other, "id"), "resourceId": first_id }),
            Some(&ada)
        ),
        "not_found"
    );
}

#[test]
fn group_events_filter_by_start_and_track_attendance() {
    let mut s = Sidecar::with_workspace("academate-group-events");
    let (ada_id, ada) = s.register("ada", "Ada Lovelace");
    let (bob_id, bob) = s.register("bob", "Bob Builder");
    let (_, cy) = s.register("cy", "Cy Twombly");

    let group = s.ok("studyGroups.create", json!({ "name": "Exam prep" }), Some(&ada));
    let group_id = str_field(&group, "id");
    s.ok("studyGroups.join", json!({ "groupId": group_id }), Some(&bob));

    assert_eq!(
        s.err_code(
            "groupTimetable.create",
            json!({
                "groupId": group_id,
                "title": "Backwards",
                "startTime": "2025-03-02T10:00:00Z",
                "endTime": "2025-03-02T09:00:00Z"
            }),
            Some(&ada)
        ),
        "bad_params"
    );
    assert_eq!(
        s.err_code(
            "groupTimetable.create",
            json!({
                "groupId": group_id,
                "title": "Outsider",
                "startTime": "2025-03-02T10:00:00Z",
                "endTime": "2025-03-02T11:00:00Z"
            }),
            Some(&cy)
        ),
        "forbidden"
    );

    let later = s.ok(
        "groupTimetable.create",
        json!({
            "groupId": group_id,
            "title": "Mock exam",
            "startTime": "2025-03-10T09:00:00",
            "endTime": "2025-03-10T12:00:00",
            "location": "Room 4"
        }),
        Some(&ada),
    );
    let earlier = s.ok(
        "groupTimetable.create",
        json!({
            "groupId": group_id,
            "title": "Kickoff",
            "startTime": "2025-03-01T18:00:00+01:00",
            "endTime": "2025-03-01T19:00:00+01:00"
        }),
        Some(&bob),
    );
    assert_eq!(earlier["startTime"], "2025-03-01T17:00:00.000Z");
    assert_eq!(later["attendees"], json!([ada_id]));
    assert_eq!(later["creatorName"], "Ada Lovelace");

    let all = s.ok("groupTimetable.list", json!({ "groupId": group_id }), Some(&cy));
    let titles: Vec<String> = all["events"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .map(|e| str_field(e, "title"))
        .collect();
    assert_eq!(titles, vec!["Kickoff", "Mock exam"]);

    let window = s.ok(
        "groupTimetable.list",
        json!({ "groupId": group_id, "startDate": "2025-03-05", "endDate": "2025-03-31" }),
        Some(&ada),
    );
    assert_eq!(window["events"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(window["events"][0]["title"], "Mock exam");
    assert_eq!(
        s.err_code(
            "groupTimetable.list",
            json!({ "groupId": group_id, "startDate": "soon" }),
            Some(&ada)
        ),
        "bad_params"
    );

    let later_id = str_field(&later, "id");
    let attend = s.ok(
        "groupTimetable.attend",
        json!({ "groupId": group_id, "eventId": later_id }),
        Some(&bob),
    );
    assert_eq!(attend["alreadyAttending"], false);
    assert_eq!(attend["attendeeCount"], 2);
    let again = s.ok(
        "groupTimetable.attend",
        json!({ "groupId": group_id, "eventId": later_id }),
        Some(&bob),
    );
    assert_eq!(again["alreadyAttending"], true);
    assert_eq!(
        s.err_code(
            "groupTimetable.attend",
            json!({ "groupId": group_id, "eventId": later_id }),
            Some(&cy)
        ),
        "forbidden"
    );
    assert_eq!(
        s.err_code(
            "groupTimetable.attend",
            json!({ "groupId": group_id, "eventId": "missing" }),
            Some(&bob)
        ),
        "not_found"
    );

    let refreshed = s.ok("groupTimetable.list", json!({ "groupId": group_id }), Some(&ada));
    assert_eq!(refreshed["events"][1]["attendees"], json!([ada_id, bob_id]));
}

#[test]
fn discussion_limit_is_clamped() {
    let mut s = Sidecar::with_workspace("academate-discussion-limit");
    let (_, ada) = s.register("ada", "Ada Lovelace");
    let group = s.ok("studyGroups.create", json!({ "name": "Chatty" }), Some(&ada));
    let group_id = str_field(&group, "id");

    for i in 1..=205 {
        s.ok(
            "discussions.create",
            json!({ "groupId": group_id, "content": format!("m{}", i) }),
            Some(&ada),
        );
    }

    let floor = s.ok(
        "discussions.list",
        json!({ "groupId": group_id, "limit": 0 }),
        Some(&ada),
    );
    assert_eq!(floor["messages"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(floor["messages"][0]["content"], "m205");

    let ceiling = s.ok(
        "discussions.list",
        json!({ "groupId": group_id, "limit": 500 }),
        Some(&ada),
    );
    let messages = ceiling["messages"].as_array().cloned().unwrap_or_default();
    assert_eq!(messages.len(), 200);
    assert_eq!(messages[0]["content"], "m6");
    assert_eq!(messages[199]["content"], "m205");

    let default = s.ok("discussions.list", json!({ "groupId": group_id }), Some(&ada));
    assert_eq!(default["messages"].as_array().map(|a| a.len()), Some(50));
}

#[test]
fn group_mutations_bump_last_activity() {
    let mut s = Sidecar::with_workspace("academate-last-activity");
    let (_, ada) = s.register("ada", "Ada Lovelace");
    let (_, bob) = s.register("bob", "Bob Builder");
    let group = s.ok("studyGroups.create", json!({ "name": "Busy" }), Some(&ada));
    let group_id = str_field(&group, "id");

    let mut last = str_field(&group, "lastActivity");
    let mut assert_bumped = |s: &mut Sidecar, what: &str| {
        let current = str_field(
            &s.ok("studyGroups.get", json!({ "groupId": group_id }), Some(&ada)),
            "lastActivity",
        );
        // Fixed-width UTC timestamps order as text.
        assert!(current > last, "{} did not move lastActivity", what);
        last = current;
        sleep(Duration::from_millis(5));
    };
    sleep(Duration::from_millis(5));

    s.ok("studyGroups.join", json!({ "groupId": group_id }), Some(&bob));
    assert_bumped(&mut s, "join");

    s.ok(
        "discussions.create",
        json!({ "groupId": group_id, "content": "hello" }),
        Some(&bob),
    );
    assert_bumped(&mut s, "message");

    s.ok(
        "resources.upload",
        json!({ "groupId": group_id, "name": "a.txt", "fileContent": "aGk=" }),
        Some(&bob),
    );
    assert_bumped(&mut s, "upload");

    let event = s.ok(
        "groupTimetable.create",
        json!({
            "groupId": group_id,
            "title": "Review",
            "startTime": "2025-04-01T10:00:00Z",
            "endTime": "2025-04-01T11:00:00Z"
        }),
        Some(&ada),
    );
    assert_bumped(&mut s, "event");

    let event_id = str_field(&event, "id");
    s.ok(
        "groupTimetable.attend",
        json!({ "groupId": group_id, "eventId": event_id }),
        Some(&bob),
    );
    assert_bumped(&mut s, "attend");

    s.ok("studyGroups.leave", json!({ "groupId": group_id }), Some(&bob));
    assert_bumped(&mut s, "leave");
}

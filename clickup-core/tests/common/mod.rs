//! Shared fixtures: a context pointed at a mock server and a small ClickUp account.
#![allow(dead_code)]

use clickup_core::Context;
use mockito::{Matcher, Mock, ServerGuard};
use serde_json::{json, Value};

pub const TOKEN: &str = "pk_test_token";

/// Context aimed at `server` with millisecond backoff and tiny batches.
pub fn test_context(server: &ServerGuard) -> Context {
    let mut ctx = Context::new();
    ctx.access_token = TOKEN.to_string();
    ctx.api_url = server.url();
    ctx.timeout_secs = 5;
    ctx.max_retries = 2;
    ctx.initial_backoff_ms = 1;
    ctx.max_backoff_ms = 5;
    ctx.batch_size = 2;
    ctx
}

/// `GET path` with any query string answering `body`.
pub async fn mock_get(server: &mut ServerGuard, path: &str, body: Value) -> Mock {
    server
        .mock("GET", path)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await
}

/// `GET path?page=N` answering `body`.
pub async fn mock_page(server: &mut ServerGuard, path: &str, page: u32, body: Value) -> Mock {
    server
        .mock("GET", path)
        .match_query(Matcher::UrlEncoded("page".into(), page.to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await
}

pub async fn mock_status(server: &mut ServerGuard, path: &str, status: usize) -> Mock {
    server
        .mock("GET", path)
        .match_query(Matcher::Any)
        .with_status(status)
        .with_body(json!({"err": "failure", "ECODE": "TEST_001"}).to_string())
        .create_async()
        .await
}

pub fn task(id: &str, name: &str, list_id: &str) -> Value {
    json!({
        "id": id,
        "custom_id": null,
        "name": name,
        "status": {"status": "open", "type": "open", "color": "#d3d3d3"},
        "date_created": "1700000000000",
        "date_updated": "1700000500000",
        "date_closed": null,
        "creator": {"id": 7, "username": "ada"},
        "priority": null,
        "parent": null,
        "team_id": "1",
        "url": format!("https://app.clickup.com/t/{}", id),
        "list": {"id": list_id},
        "folder": {"id": "100"},
        "space": {"id": "10"},
        "tags": []
    })
}

/// One team (`1`) with two members, spaces `10` and `11`. Space `10` holds
/// folder `100` with lists `900` and `901`, plus folderless list `902`.
/// List `900` has three tasks over two pages, `901` one task, `902` none.
pub async fn mount_account(server: &mut ServerGuard) -> Vec<Mock> {
    let mut mocks = Vec::new();

    mocks.push(
        mock_get(
            server,
            "/team",
            json!({"teams": [{
                "id": "1",
                "name": "Acme",
                "color": "#7b68ee",
                "avatar": null,
                "members": [
                    {"user": {"id": 7, "username": "ada", "email": "ada@example.com", "color": "#fff", "initials": "A", "role": 1}},
                    {"user": {"id": 8, "username": "bob", "email": "bob@example.com", "color": "#000", "initials": "B", "role": 3}}
                ]
            }]}),
        )
        .await,
    );

    mocks.push(
        mock_get(
            server,
            "/team/1/space",
            json!({"spaces": [
                {"id": "10", "name": "Engineering", "private": false, "statuses": [{"status": "open"}]},
                {"id": "11", "name": "Marketing", "private": true}
            ]}),
        )
        .await,
    );

    mocks.push(
        mock_get(
            server,
            "/space/10/folder",
            json!({"folders": [{
                "id": "100",
                "name": "Backend",
                "hidden": false,
                "space": {"id": "10", "name": "Engineering"},
                "task_count": "4",
                "lists": [{"id": "900"}, {"id": "901"}]
            }]}),
        )
        .await,
    );
    mocks.push(mock_get(server, "/space/11/folder", json!({"folders": []})).await);

    mocks.push(
        mock_get(
            server,
            "/folder/100/list",
            json!({"lists": [
                {"id": "900", "name": "Sprint 1", "folder": {"id": "100"}, "space": {"id": "10"}},
                {"id": "901", "name": "Sprint 2", "folder": {"id": "100"}, "space": {"id": "10"}}
            ]}),
        )
        .await,
    );
    mocks.push(
        mock_get(
            server,
            "/space/10/list",
            json!({"lists": [
                {"id": "902", "name": "Inbox", "folder": {"id": "555", "hidden": true}, "space": {"id": "10"}}
            ]}),
        )
        .await,
    );
    mocks.push(mock_get(server, "/space/11/list", json!({"lists": []})).await);

    mocks.push(
        mock_page(
            server,
            "/list/900/task",
            0,
            json!({"tasks": [task("t1", "Design schema", "900"), task("t2", "Write client", "900")], "last_page": false}),
        )
        .await,
    );
    mocks.push(
        mock_page(
            server,
            "/list/900/task",
            1,
            json!({"tasks": [task("t3", "Write sink", "900")], "last_page": true}),
        )
        .await,
    );
    mocks.push(
        mock_get(
            server,
            "/list/901/task",
            json!({"tasks": [task("t4", "Release", "901")], "last_page": true}),
        )
        .await,
    );
    mocks.push(mock_get(server, "/list/902/task", json!({"tasks": [], "last_page": true})).await);

    mocks.push(
        mock_get(
            server,
            "/team/1/time_entries",
            json!({"data": [
                {
                    "id": "te1",
                    "task": {"id": "t1", "name": "Design schema"},
                    "wid": "1",
                    "user": {"id": 7, "username": "ada"},
                    "billable": false,
                    "start": "1700000000000",
                    "end": "1700003600000",
                    "duration": "3600000",
                    "description": "",
                    "tags": [],
                    "at": "1700003600000"
                },
                {
                    "id": "te2",
                    "task": "0",
                    "wid": "1",
                    "user": {"id": 8, "username": "bob"},
                    "billable": true,
                    "start": "1700010000000",
                    "end": "1700010900000",
                    "duration": "900000",
                    "description": "standup",
                    "tags": [],
                    "at": "1700010900000"
                }
            ]}),
        )
        .await,
    );

    mocks
}

//! End-to-end runs of the fetch pipeline against a mock ClickUp account.

mod common;

use clickup_core::{ApiClient, ClickUpError, Pipeline, Resource, SqliteSink};
use common::*;
use mockito::Server;
use serde_json::json;

async fn count(sink: &SqliteSink, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(sink.pool()).await.unwrap()
}

#[tokio::test]
async fn test_full_account_fetch() {
    let mut server = Server::new_async().await;
    let mocks = mount_account(&mut server).await;
    let ctx = test_context(&server);
    let client = ApiClient::new(&ctx).unwrap();
    let sink = SqliteSink::in_memory().await.unwrap();

    let summary = Pipeline::new(&client, &sink, &ctx).run().await.unwrap();

    assert_eq!(sink.count("teams").await.unwrap(), 1);
    assert_eq!(sink.count("members").await.unwrap(), 2);
    assert_eq!(sink.count("spaces").await.unwrap(), 2);
    assert_eq!(sink.count("folders").await.unwrap(), 1);
    assert_eq!(sink.count("lists").await.unwrap(), 3);
    assert_eq!(sink.count("tasks").await.unwrap(), 4);
    assert_eq!(sink.count("timeentries").await.unwrap(), 2);

    assert_eq!(summary.rows(Resource::Tasks), 4);
    assert_eq!(summary.rows(Resource::Members), 2);
    assert_eq!(summary.skipped, 0);

    for mock in mocks {
        mock.assert_async().await;
    }
}

#[tokio::test]
async fn test_parent_ids_are_recorded() {
    let mut server = Server::new_async().await;
    let _mocks = mount_account(&mut server).await;
    let ctx = test_context(&server);
    let client = ApiClient::new(&ctx).unwrap();
    let sink = SqliteSink::in_memory().await.unwrap();

    Pipeline::new(&client, &sink, &ctx).run().await.unwrap();

    // 1 team, spaces 10 and 11, space 10 with three lists
    let spaces: Vec<(String, String)> =
        sqlx::query_as("SELECT id, team_id FROM spaces ORDER BY id")
            .fetch_all(sink.pool())
            .await
            .unwrap();
    assert_eq!(
        spaces,
        vec![
            ("10".to_string(), "1".to_string()),
            ("11".to_string(), "1".to_string())
        ]
    );

    let lists: Vec<(String, Option<String>, String)> =
        sqlx::query_as("SELECT id, folder_id, space_id FROM lists ORDER BY id")
            .fetch_all(sink.pool())
            .await
            .unwrap();
    assert_eq!(
        lists,
        vec![
            ("900".to_string(), Some("100".to_string()), "10".to_string()),
            ("901".to_string(), Some("100".to_string()), "10".to_string()),
            ("902".to_string(), None, "10".to_string()),
        ]
    );

    let members: Vec<(i64, String)> =
        sqlx::query_as("SELECT id, team_id FROM members ORDER BY id")
            .fetch_all(sink.pool())
            .await
            .unwrap();
    assert_eq!(members, vec![(7, "1".to_string()), (8, "1".to_string())]);

    // Every child points at a persisted parent
    for sql in [
        "SELECT COUNT(*) FROM spaces WHERE team_id NOT IN (SELECT id FROM teams)",
        "SELECT COUNT(*) FROM folders WHERE space_id NOT IN (SELECT id FROM spaces)",
        "SELECT COUNT(*) FROM lists WHERE space_id NOT IN (SELECT id FROM spaces)",
        "SELECT COUNT(*) FROM lists WHERE folder_id IS NOT NULL AND folder_id NOT IN (SELECT id FROM folders)",
        "SELECT COUNT(*) FROM tasks WHERE list_id NOT IN (SELECT id FROM lists)",
        "SELECT COUNT(*) FROM timeentries WHERE task_id IS NOT NULL AND task_id NOT IN (SELECT id FROM tasks)",
        "SELECT COUNT(*) FROM timeentries WHERE user_id NOT IN (SELECT id FROM members)",
    ] {
        assert_eq!(count(&sink, sql).await, 0, "{}", sql);
    }
}

#[tokio::test]
async fn test_record_conversions_persisted() {
    let mut server = Server::new_async().await;
    let _mocks = mount_account(&mut server).await;
    let ctx = test_context(&server);
    let client = ApiClient::new(&ctx).unwrap();
    let sink = SqliteSink::in_memory().await.unwrap();

    Pipeline::new(&client, &sink, &ctx).run().await.unwrap();

    let (status, created, creator, list_id): (String, String, i64, String) = sqlx::query_as(
        "SELECT status, date_created, creator_id, list_id FROM tasks WHERE id = 't3'",
    )
    .fetch_one(sink.pool())
    .await
    .unwrap();
    assert_eq!(status, "open");
    assert_eq!(created, "2023-11-14T22:13:20.000Z");
    assert_eq!(creator, 7);
    assert_eq!(list_id, "900");

    let entries: Vec<(String, Option<String>, f64)> =
        sqlx::query_as("SELECT id, task_id, duration FROM timeentries ORDER BY id")
            .fetch_all(sink.pool())
            .await
            .unwrap();
    assert_eq!(
        entries,
        vec![
            ("te1".to_string(), Some("t1".to_string()), 3600.0),
            ("te2".to_string(), None, 900.0),
        ]
    );

    // Nested lists of folders are not stored, extra keys are
    let columns = sink.columns("folders").await.unwrap();
    assert!(!columns.contains(&"lists".to_string()));
    assert!(columns.contains(&"task_count".to_string()));
    assert!(sink.columns("spaces").await.unwrap().contains(&"statuses".to_string()));
}

#[tokio::test]
async fn test_rerun_is_idempotent_and_updates_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clickup.db");

    let mut server = Server::new_async().await;
    let mut mocks = mount_account(&mut server).await;
    let ctx = test_context(&server);
    let client = ApiClient::new(&ctx).unwrap();

    let sink = SqliteSink::open(&path).await.unwrap();
    Pipeline::new(&client, &sink, &ctx).run().await.unwrap();
    sink.close().await;

    // Task t4 gets renamed remotely (mount order puts list 901 at index 9)
    mocks.remove(9).remove_async().await;
    let _renamed = mock_get(
        &mut server,
        "/list/901/task",
        json!({"tasks": [task("t4", "Release 1.0", "901")], "last_page": true}),
    )
    .await;

    let sink = SqliteSink::open(&path).await.unwrap();
    Pipeline::new(&client, &sink, &ctx).run().await.unwrap();

    assert_eq!(sink.count("teams").await.unwrap(), 1);
    assert_eq!(sink.count("lists").await.unwrap(), 3);
    assert_eq!(sink.count("tasks").await.unwrap(), 4);
    assert_eq!(sink.count("timeentries").await.unwrap(), 2);

    let name: String = sqlx::query_scalar("SELECT name FROM tasks WHERE id = 't4'")
        .fetch_one(sink.pool())
        .await
        .unwrap();
    assert_eq!(name, "Release 1.0");
    sink.close().await;
}

#[tokio::test]
async fn test_failure_keeps_committed_batches() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clickup.db");

    let mut server = Server::new_async().await;
    let _team = mock_get(&mut server, "/team", json!({"teams": [{"id": "1", "name": "Acme", "members": []}]})).await;
    let _spaces = mock_get(
        &mut server,
        "/team/1/space",
        json!({"spaces": [{"id": "10", "name": "Engineering"}, {"id": "11", "name": "Marketing"}]}),
    )
    .await;
    let _broken = mock_status(&mut server, "/space/10/folder", 500).await;

    let ctx = test_context(&server);
    let client = ApiClient::new(&ctx).unwrap();
    let sink = SqliteSink::open(&path).await.unwrap();

    let err = Pipeline::new(&client, &sink, &ctx).run().await.unwrap_err();
    sink.close().await;

    match &err {
        ClickUpError::Fetch { resource, parent, .. } => {
            assert_eq!(*resource, Resource::Folders);
            assert_eq!(parent.as_deref(), Some("10"));
        }
        other => panic!("expected a fetch error, got {}", other),
    }
    assert!(matches!(
        err.root(),
        ClickUpError::ExhaustedRetries { attempts: 3, .. }
    ));

    let sink = SqliteSink::open(&path).await.unwrap();
    assert_eq!(sink.count("teams").await.unwrap(), 1);
    assert_eq!(sink.count("spaces").await.unwrap(), 2);
    assert!(!sink.has_table("folders").await.unwrap());
    sink.close().await;
}

#[tokio::test]
async fn test_vanished_parent_is_skipped() {
    let mut server = Server::new_async().await;
    let _team = mock_get(&mut server, "/team", json!({"teams": [{"id": "1", "name": "Acme"}]})).await;
    let _spaces = mock_get(
        &mut server,
        "/team/1/space",
        json!({"spaces": [{"id": "10", "name": "Engineering"}, {"id": "11", "name": "Gone"}]}),
    )
    .await;
    let _folders = mock_get(&mut server, "/space/10/folder", json!({"folders": []})).await;
    let _gone_folders = mock_status(&mut server, "/space/11/folder", 404).await;
    let _lists = mock_get(
        &mut server,
        "/space/10/list",
        json!({"lists": [{"id": "902", "name": "Inbox", "space": {"id": "10"}}]}),
    )
    .await;
    let _gone_lists = mock_status(&mut server, "/space/11/list", 404).await;
    let _tasks = mock_get(
        &mut server,
        "/list/902/task",
        json!({"tasks": [task("t9", "Triage", "902")], "last_page": true}),
    )
    .await;
    let _entries = mock_get(&mut server, "/team/1/time_entries", json!({"data": []})).await;

    let ctx = test_context(&server);
    let client = ApiClient::new(&ctx).unwrap();
    let sink = SqliteSink::in_memory().await.unwrap();

    let summary = Pipeline::new(&client, &sink, &ctx).run().await.unwrap();

    assert_eq!(summary.skipped, 2);
    assert_eq!(sink.count("lists").await.unwrap(), 1);
    assert_eq!(sink.count("tasks").await.unwrap(), 1);
}

#[tokio::test]
async fn test_bad_token_stops_before_writing() {
    let mut server = Server::new_async().await;
    let unauthorized = server
        .mock("GET", "/team")
        .with_status(401)
        .with_body(json!({"err": "Token invalid", "ECODE": "OAUTH_025"}).to_string())
        .expect(1)
        .create_async()
        .await;

    let ctx = test_context(&server);
    let client = ApiClient::new(&ctx).unwrap();
    let sink = SqliteSink::in_memory().await.unwrap();

    let err = Pipeline::new(&client, &sink, &ctx).run().await.unwrap_err();

    assert!(matches!(err.root(), ClickUpError::Authentication(_)));
    assert!(sink.tables().await.unwrap().is_empty());
    unauthorized.assert_async().await;
}

#[tokio::test]
async fn test_write_failure_in_tasks_keeps_earlier_stages() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clickup.db");

    let sink = SqliteSink::open(&path).await.unwrap();
    sqlx::query("CREATE TABLE tasks (id TEXT PRIMARY KEY)")
        .execute(sink.pool())
        .await
        .unwrap();
    sqlx::query(
        "CREATE TRIGGER tasks_locked BEFORE INSERT ON tasks \
         BEGIN SELECT RAISE(ABORT, 'tasks are locked'); END",
    )
    .execute(sink.pool())
    .await
    .unwrap();

    let mut server = Server::new_async().await;
    let _mocks = mount_account(&mut server).await;
    let ctx = test_context(&server);
    let client = ApiClient::new(&ctx).unwrap();

    let err = Pipeline::new(&client, &sink, &ctx).run().await.unwrap_err();
    sink.close().await;

    match &err {
        ClickUpError::Fetch { resource, parent, .. } => {
            assert_eq!(*resource, Resource::Tasks);
            assert_eq!(parent.as_deref(), Some("900"));
        }
        other => panic!("expected a fetch error, got {}", other),
    }
    assert!(matches!(err.root(), ClickUpError::Persistence(_)));

    let sink = SqliteSink::open(&path).await.unwrap();
    assert_eq!(sink.count("teams").await.unwrap(), 1);
    assert_eq!(sink.count("members").await.unwrap(), 2);
    assert_eq!(sink.count("spaces").await.unwrap(), 2);
    assert_eq!(sink.count("folders").await.unwrap(), 1);
    assert_eq!(sink.count("lists").await.unwrap(), 3);
    assert_eq!(sink.count("tasks").await.unwrap(), 0);
    assert_eq!(sink.columns("tasks").await.unwrap(), vec!["id"]);
    assert!(!sink.has_table("timeentries").await.unwrap());
    sink.close().await;
}

#[tokio::test]
async fn test_large_team_members_are_written_in_batches() {
    let mut server = Server::new_async().await;
    let members: Vec<_> = (1..=5)
        .map(|id| json!({"user": {"id": id, "username": format!("user{}", id)}}))
        .collect();
    let _team = mock_get(
        &mut server,
        "/team",
        json!({"teams": [{"id": "1", "name": "Acme", "members": members}]}),
    )
    .await;

    let ctx = test_context(&server);
    let client = ApiClient::new(&ctx).unwrap();
    let sink = SqliteSink::in_memory().await.unwrap();

    // The fifth member fails, so only whole batches of two survive
    sqlx::query("CREATE TABLE members (id INTEGER PRIMARY KEY)")
        .execute(sink.pool())
        .await
        .unwrap();
    sqlx::query(
        "CREATE TRIGGER reject_fifth BEFORE INSERT ON members WHEN NEW.id = 5 \
         BEGIN SELECT RAISE(ABORT, 'rejected'); END",
    )
    .execute(sink.pool())
    .await
    .unwrap();

    let err = Pipeline::new(&client, &sink, &ctx).run().await.unwrap_err();

    match &err {
        ClickUpError::Fetch { resource, .. } => assert_eq!(*resource, Resource::Members),
        other => panic!("expected a fetch error, got {}", other),
    }
    assert_eq!(sink.count("teams").await.unwrap(), 1);
    assert_eq!(sink.count("members").await.unwrap(), 4);
}

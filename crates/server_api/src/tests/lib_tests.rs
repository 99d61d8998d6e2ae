use super::*;
use chrono::{TimeZone, Utc};

async fn setup() -> ApiContext {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    ApiContext::new(storage)
}

async fn create(ctx: &ApiContext, text: &str) -> TodoItem {
    create_todo(
        ctx,
        CreateTodoRequest {
            text: text.to_string(),
        },
    )
    .await
    .expect("create")
}

fn texts(page: &TodoPage) -> Vec<&str> {
    page.data.iter().map(|item| item.text.as_str()).collect()
}

#[tokio::test]
async fn create_assigns_increasing_seq() {
    let ctx = setup().await;
    let first = create(&ctx, "first").await;
    let second = create(&ctx, "  second  ").await;

    assert_eq!(first.seq, 1.0);
    assert_eq!(second.seq, 2.0);
    assert_eq!(second.text, "second");
    assert!(!second.completed);
    assert_ne!(first.id, second.id);
}

#[tokio::test]
async fn create_rejects_blank_text() {
    let ctx = setup().await;
    let err = create_todo(
        &ctx,
        CreateTodoRequest {
            text: "   ".into(),
        },
    )
    .await
    .expect_err("blank");
    assert_eq!(err.code, ErrorCode::Validation);

    let err = create_todo(
        &ctx,
        CreateTodoRequest {
            text: "x".repeat(MAX_TEXT_CHARS + 1),
        },
    )
    .await
    .expect_err("too long");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn list_pages_and_filters() {
    let ctx = setup().await;
    for text in ["one", "two", "three", "four", "five"] {
        create(&ctx, text).await;
    }

    let all = list_todos(&ctx, &ListTodosQuery::default())
        .await
        .expect("list");
    assert_eq!(texts(&all), vec!["one", "two", "three", "four", "five"]);
    assert_eq!(all.count, 5);

    let page_two = list_todos(
        &ctx,
        &ListTodosQuery {
            page_number: Some(2),
            n_per_page: Some(2),
            completed: None,
        },
    )
    .await
    .expect("list");
    assert_eq!(texts(&page_two), vec!["three", "four"]);
    assert_eq!(page_two.count, 5);

    let two = all.data[1].id.clone();
    update_todo(
        &ctx,
        &two,
        UpdateTodoRequest::CompleteTask { completed: true },
    )
    .await
    .expect("complete");

    let done = list_todos(
        &ctx,
        &ListTodosQuery {
            completed: Some(true),
            ..ListTodosQuery::default()
        },
    )
    .await
    .expect("list");
    assert_eq!(texts(&done), vec!["two"]);
    assert_eq!(done.count, 1);
}

#[tokio::test]
async fn page_size_is_capped() {
    let ctx = setup().await.with_max_page_size(2);
    for text in ["a", "b", "c"] {
        create(&ctx, text).await;
    }

    let page = list_todos(
        &ctx,
        &ListTodosQuery {
            page_number: Some(1),
            n_per_page: Some(50),
            completed: None,
        },
    )
    .await
    .expect("list");
    assert_eq!(texts(&page), vec!["a", "b"]);
    assert_eq!(page.count, 3);
}

#[test]
fn page_window_treats_zero_or_first_page_as_start() {
    let window = page_window(
        &ListTodosQuery {
            page_number: Some(0),
            n_per_page: Some(10),
            completed: None,
        },
        100,
    );
    assert_eq!(window.offset, 0);
    assert_eq!(window.limit, Some(10));

    let window = page_window(
        &ListTodosQuery {
            page_number: Some(3),
            n_per_page: Some(0),
            completed: Some(false),
        },
        100,
    );
    assert_eq!(window.offset, 0);
    assert_eq!(window.limit, None);
    assert_eq!(window.completed, Some(false));

    let window = page_window(
        &ListTodosQuery {
            page_number: Some(4),
            n_per_page: Some(25),
            completed: None,
        },
        100,
    );
    assert_eq!(window.offset, 75);
}

#[tokio::test]
async fn update_sets_and_clears_due_date() {
    let ctx = setup().await;
    let item = create(&ctx, "file taxes").await;
    let due = Utc.with_ymd_and_hms(2026, 4, 15, 23, 59, 0).unwrap();

    let updated = update_todo(
        &ctx,
        &item.id,
        UpdateTodoRequest::SetDueDate {
            due_date: Some(due),
        },
    )
    .await
    .expect("set due date");
    assert_eq!(updated.due_date, Some(due));
    assert_eq!(updated.seq, item.seq);

    let cleared = update_todo(
        &ctx,
        &item.id,
        UpdateTodoRequest::SetDueDate { due_date: None },
    )
    .await
    .expect("clear due date");
    assert_eq!(cleared.due_date, None);
}

#[tokio::test]
async fn update_missing_item_is_not_found() {
    let ctx = setup().await;
    let err = update_todo(
        &ctx,
        &ItemId::from("missing"),
        UpdateTodoRequest::CompleteTask { completed: true },
    )
    .await
    .expect_err("missing");
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn reorder_moves_item_and_reports_outcome() {
    let ctx = setup().await;
    let mut ids = Vec::new();
    for text in ["a", "b", "c", "d"] {
        ids.push(create(&ctx, text).await.id);
    }

    let response = reorder_todos(
        &ctx,
        ReorderRequest {
            source_id: ids[3].clone(),
            destination_id: ids[1].clone(),
        },
    )
    .await
    .expect("reorder");
    assert!(response.moved);
    assert_eq!(response.item.seq, 1.5);

    let page = list_todos(&ctx, &ListTodosQuery::default())
        .await
        .expect("list");
    assert_eq!(texts(&page), vec!["a", "d", "b", "c"]);

    let same = reorder_todos(
        &ctx,
        ReorderRequest {
            source_id: ids[2].clone(),
            destination_id: ids[2].clone(),
        },
    )
    .await
    .expect("self reorder");
    assert!(!same.moved);
}

#[tokio::test]
async fn reorder_with_unknown_id_is_not_found() {
    let ctx = setup().await;
    let a = create(&ctx, "a").await;
    let err = reorder_todos(
        &ctx,
        ReorderRequest {
            source_id: a.id.clone(),
            destination_id: ItemId::from("nope"),
        },
    )
    .await
    .expect_err("unknown");
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn delete_removes_item_once() {
    let ctx = setup().await;
    let item = create(&ctx, "gone soon").await;

    delete_todo(&ctx, &item.id).await.expect("delete");
    let err = delete_todo(&ctx, &item.id).await.expect_err("second delete");
    assert_eq!(err.code, ErrorCode::NotFound);

    let page = list_todos(&ctx, &ListTodosQuery::default())
        .await
        .expect("list");
    assert_eq!(page.count, 0);
}

#[test]
fn update_body_errors_name_the_field() {
    let err = parse_update_request(serde_json::json!({
        "action": "COMPLETE_TASK",
        "completed": "yes",
    }))
    .expect_err("bad completed");
    assert_eq!(err.message, "invalid 'completed' expected boolean");

    let err = parse_update_request(serde_json::json!({
        "action": "SET_DUE_TO_DATE",
        "dueDate": "tomorrow",
    }))
    .expect_err("bad due date");
    assert!(err.message.contains("dueDate"));

    let err =
        parse_update_request(serde_json::json!({ "action": "REORDER" })).expect_err("unknown");
    assert_eq!(err.message, "action is not defined");
    assert_eq!(err.code, ErrorCode::Validation);

    let ok = parse_update_request(serde_json::json!({
        "action": "COMPLETE_TASK",
        "completed": false,
    }))
    .expect("valid");
    assert_eq!(ok, UpdateTodoRequest::CompleteTask { completed: false });
}

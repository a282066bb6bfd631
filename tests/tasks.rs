mod common;

use actix_web::test;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;

use common::{bearer, default_state, init_app, register_user, test_state, StubSuggestions};
use taskboard::store::MemoryStore;
use taskboard::suggestions::SuggestedTask;

#[actix_rt::test]
async fn test_task_crud() {
    let app = init_app(default_state(Arc::new(MemoryStore::new()))).await;
    let (user_id, token) = register_user(&app, "Ada", "a@x.com").await;

    // Create
    let req = test::TestRequest::post()
        .uri("/api/tasks")
        .insert_header(bearer(&token))
        .set_json(json!({
            "title": "  Buy groceries ",
            "description": "Milk, eggs",
            "due_date": "2024-12-01",
            "priority": "HIGH",
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Task created successfully");
    let task = &body["data"];
    assert_eq!(task["title"], "Buy groceries");
    assert_eq!(task["description"], "Milk, eggs");
    assert_eq!(task["due_date"], "2024-12-01");
    assert_eq!(task["priority"], "high");
    assert_eq!(task["completed"], false);
    assert_eq!(task["is_completed"], false);
    assert_eq!(task["user_id"], user_id);
    let task_id = task["id"].as_i64().unwrap();

    // Read
    let req = test::TestRequest::get()
        .uri(&format!("/api/tasks/{}", task_id))
        .insert_header(bearer(&token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["id"], task_id);

    // Update: absent fields keep their value, null clears.
    let req = test::TestRequest::patch()
        .uri(&format!("/api/tasks/{}", task_id))
        .insert_header(bearer(&token))
        .set_json(json!({ "title": "Buy bread", "due_date": null }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["title"], "Buy bread");
    assert_eq!(body["data"]["description"], "Milk, eggs");
    assert_eq!(body["data"]["due_date"], Value::Null);
    assert_eq!(body["data"]["priority"], "high");

    let req = test::TestRequest::put()
        .uri(&format!("/api/tasks/{}", task_id))
        .insert_header(bearer(&token))
        .set_json(json!({ "priority": "low", "completed": true }))
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(body["data"]["priority"], "low");
    assert_eq!(body["data"]["completed"], true);

    // Delete
    let req = test::TestRequest::delete()
        .uri(&format!("/api/tasks/{}", task_id))
        .insert_header(bearer(&token))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);

    let req = test::TestRequest::get()
        .uri(&format!("/api/tasks/{}", task_id))
        .insert_header(bearer(&token))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/tasks/{}", task_id))
        .insert_header(bearer(&token))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_rt::test]
async fn test_create_defaults() {
    let app = init_app(default_state(Arc::new(MemoryStore::new()))).await;
    let (_, token) = register_user(&app, "Ada", "a@x.com").await;

    let req = test::TestRequest::post()
        .uri("/api/tasks")
        .insert_header(bearer(&token))
        .set_json(json!({ "title": "Just a title" }))
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(body["data"]["priority"], "medium");
    assert_eq!(body["data"]["completed"], false);
    assert_eq!(body["data"]["due_date"], Value::Null);
}

#[actix_rt::test]
async fn test_toggle_twice_restores_state() {
    let app = init_app(default_state(Arc::new(MemoryStore::new()))).await;
    let (_, token) = register_user(&app, "Ada", "a@x.com").await;

    let req = test::TestRequest::post()
        .uri("/api/tasks")
        .insert_header(bearer(&token))
        .set_json(json!({ "title": "Water plants" }))
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    let task_id = body["data"]["id"].as_i64().unwrap();

    for expected in [true, false] {
        let req = test::TestRequest::patch()
            .uri(&format!("/api/tasks/{}/toggle", task_id))
            .insert_header(bearer(&token))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["completed"], expected);
        assert_eq!(body["message"], "Task status toggled successfully");
    }
}

#[actix_rt::test]
async fn test_tasks_are_isolated_between_users() {
    let app = init_app(default_state(Arc::new(MemoryStore::new()))).await;
    let (_, owner) = register_user(&app, "Ada", "a@x.com").await;
    let (_, intruder) = register_user(&app, "Bob", "b@x.com").await;

    let req = test::TestRequest::post()
        .uri("/api/tasks")
        .insert_header(bearer(&owner))
        .set_json(json!({ "title": "Private" }))
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    let uri = format!("/api/tasks/{}", body["data"]["id"]);

    let req = test::TestRequest::get()
        .uri("/api/tasks")
        .insert_header(bearer(&intruder))
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(body["data"], json!([]));

    let attempts = vec![
        test::TestRequest::get().uri(&uri),
        test::TestRequest::patch()
            .uri(&uri)
            .set_json(json!({ "title": "Mine now" })),
        test::TestRequest::patch().uri(&format!("{}/toggle", uri)),
        test::TestRequest::delete().uri(&uri),
    ];
    for attempt in attempts {
        let req = attempt.insert_header(bearer(&intruder)).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 403);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "You are not authorized to access this task.");
    }

    let req = test::TestRequest::get()
        .uri(&uri)
        .insert_header(bearer(&owner))
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(body["data"]["title"], "Private");
}

#[actix_rt::test]
async fn test_owner_cannot_be_reassigned() {
    let app = init_app(default_state(Arc::new(MemoryStore::new()))).await;
    let (owner_id, token) = register_user(&app, "Ada", "a@x.com").await;
    let (other_id, _) = register_user(&app, "Bob", "b@x.com").await;

    let req = test::TestRequest::post()
        .uri("/api/tasks")
        .insert_header(bearer(&token))
        .set_json(json!({ "title": "Keep me" }))
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    let task_id = body["data"]["id"].as_i64().unwrap();

    let req = test::TestRequest::patch()
        .uri(&format!("/api/tasks/{}", task_id))
        .insert_header(bearer(&token))
        .set_json(json!({ "title": "Still mine", "user_id": other_id }))
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(body["data"]["title"], "Still mine");
    assert_eq!(body["data"]["user_id"], owner_id);
}

#[actix_rt::test]
async fn test_task_validation() {
    let app = init_app(default_state(Arc::new(MemoryStore::new()))).await;
    let (_, token) = register_user(&app, "Ada", "a@x.com").await;

    let invalid = [
        (json!({}), "title"),
        (json!({ "title": "   " }), "title"),
        (json!({ "title": "x".repeat(256) }), "title"),
        (json!({ "title": "Ok", "due_date": "tomorrow" }), "due_date"),
        (json!({ "title": "Ok", "priority": "urgent" }), "priority"),
    ];
    for (payload, field) in invalid {
        let req = test::TestRequest::post()
            .uri("/api/tasks")
            .insert_header(bearer(&token))
            .set_json(payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 422);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["errors"][field].is_array(), "expected an error for {}", field);
    }

    let req = test::TestRequest::post()
        .uri("/api/tasks")
        .insert_header(bearer(&token))
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{\"title\": ")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::get()
        .uri("/api/tasks/abc")
        .insert_header(bearer(&token))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_rt::test]
async fn test_list_order() {
    let app = init_app(default_state(Arc::new(MemoryStore::new()))).await;
    let (_, token) = register_user(&app, "Ada", "a@x.com").await;

    let mut ids = Vec::new();
    for title in ["first", "second", "third"] {
        let req = test::TestRequest::post()
            .uri("/api/tasks")
            .insert_header(bearer(&token))
            .set_json(json!({ "title": title }))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
        ids.push(body["data"]["id"].as_i64().unwrap());
    }

    let req = test::TestRequest::patch()
        .uri(&format!("/api/tasks/{}/toggle", ids[2]))
        .insert_header(bearer(&token))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::get()
        .uri("/api/tasks")
        .insert_header(bearer(&token))
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    let titles: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|task| task["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["second", "first", "third"]);
}

#[actix_rt::test]
async fn test_unauthenticated_requests_are_rejected() {
    let app = init_app(default_state(Arc::new(MemoryStore::new()))).await;

    let req = test::TestRequest::get().uri("/api/tasks").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Unauthenticated.");

    let req = test::TestRequest::post()
        .uri("/api/tasks")
        .insert_header(bearer("not-a-token"))
        .set_json(json!({ "title": "Sneaky" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}

#[actix_rt::test]
async fn test_suggestions_are_stored_for_caller() {
    let store = Arc::new(MemoryStore::new());
    let stub = StubSuggestions {
        tasks: vec![
            SuggestedTask {
                title: Some("Book flights".into()),
                description: Some("Compare prices".into()),
                completed: None,
                due_date: Some("2024-10-01".into()),
            },
            SuggestedTask::default(),
        ],
        fail: false,
    };
    let app = init_app(test_state(store, Arc::new(stub))).await;
    let (user_id, token) = register_user(&app, "Ada", "a@x.com").await;

    let req = test::TestRequest::post()
        .uri("/api/tasks/suggestions")
        .insert_header(bearer(&token))
        .set_json(json!({ "prompt": "Plan a trip to Lisbon" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Tasks generated successfully");

    let tasks = body["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0]["title"], "Book flights");
    assert_eq!(tasks[0]["due_date"], "2024-10-01");
    assert_eq!(tasks[1]["title"], "Untitled");
    assert_eq!(tasks[1]["description"], "");
    for task in tasks {
        assert_eq!(task["priority"], "high");
        assert_eq!(task["user_id"], user_id);
        assert_eq!(task["completed"], false);
    }

    let req = test::TestRequest::get()
        .uri("/api/tasks")
        .insert_header(bearer(&token))
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[actix_rt::test]
async fn test_suggestion_failures() {
    let store = Arc::new(MemoryStore::new());
    let stub = StubSuggestions {
        tasks: Vec::new(),
        fail: true,
    };
    let app = init_app(test_state(store, Arc::new(stub))).await;
    let (_, token) = register_user(&app, "Ada", "a@x.com").await;

    let req = test::TestRequest::post()
        .uri("/api/tasks/suggestions")
        .insert_header(bearer(&token))
        .set_json(json!({ "prompt": "Plan my week" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 500);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Failed to generate tasks from AI");

    let req = test::TestRequest::post()
        .uri("/api/tasks/suggestions")
        .insert_header(bearer(&token))
        .set_json(json!({ "prompt": "x".repeat(1001) }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 422);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["errors"]["prompt"].is_array());

    let req = test::TestRequest::post()
        .uri("/api/tasks/suggestions")
        .insert_header(bearer(&token))
        .set_json(json!({}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 422);
}

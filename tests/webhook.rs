use actix_web::{web, App, HttpResponse, HttpServer};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::net::TcpListener;
use std::time::Duration;

use taskboard::suggestions::{SuggestionError, SuggestionSource, WebhookSuggestionSource};

async fn planner(body: web::Json<Value>) -> HttpResponse {
    let prompt = body["chatInput"].as_str().unwrap_or_default().to_string();
    HttpResponse::Ok().json(json!({
        "output": [
            { "titulo": format!("Plan: {}", prompt), "descripcion": "Outline the steps", "fecha_limite": "2024-11-15" },
            { "titulo": "Review", "completada": true }
        ]
    }))
}

async fn broken() -> HttpResponse {
    HttpResponse::BadGateway().body("upstream down")
}

async fn garbled() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("application/json")
        .body("{\"output\": [")
}

fn serve() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = HttpServer::new(|| {
        App::new()
            .route("/plan", web::post().to(planner))
            .route("/broken", web::post().to(broken))
            .route("/garbled", web::post().to(garbled))
    })
    .workers(1)
    .listen(listener)
    .unwrap()
    .run();
    actix_rt::spawn(server);
    format!("http://127.0.0.1:{}", port)
}

fn source(url: String) -> WebhookSuggestionSource {
    WebhookSuggestionSource::new(url, Duration::from_secs(5)).unwrap()
}

#[actix_rt::test]
async fn test_webhook_reply_is_mapped() {
    let base = serve();
    let suggested = source(format!("{}/plan", base))
        .suggest("Move flat")
        .await
        .unwrap();

    assert_eq!(suggested.len(), 2);
    assert_eq!(suggested[0].title.as_deref(), Some("Plan: Move flat"));
    assert_eq!(suggested[0].description.as_deref(), Some("Outline the steps"));
    assert_eq!(suggested[0].due_date.as_deref(), Some("2024-11-15"));
    assert_eq!(suggested[1].completed, Some(true));
}

#[actix_rt::test]
async fn test_webhook_failures() {
    let base = serve();

    let result = source(format!("{}/broken", base)).suggest("anything").await;
    assert!(matches!(result, Err(SuggestionError::Status(502))));

    let result = source(format!("{}/garbled", base)).suggest("anything").await;
    assert!(matches!(result, Err(SuggestionError::Transport(_))));
}

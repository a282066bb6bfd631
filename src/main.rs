use actix_cors::Cors;
use actix_web::{http::header, middleware::Logger, web, App, HttpServer};
use std::sync::Arc;

use taskboard::{
    config::Config,
    routes,
    state::AppState,
    store::{MemoryStore, PgStore},
    suggestions::{DisabledSuggestions, SuggestionSource, WebhookSuggestionSource},
};

fn cors(config: &Config) -> Cors {
    let cors = match &config.cors_allowed_origin {
        Some(origin) => Cors::default()
            .allowed_origin(origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE"])
            .allowed_headers(vec![
                header::AUTHORIZATION,
                header::ACCEPT,
                header::CONTENT_TYPE,
            ])
            .allowed_header("X-XSRF-TOKEN")
            .supports_credentials(),
        None => Cors::permissive(),
    };
    cors.max_age(3600)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = Config::from_env()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    let suggestions: Arc<dyn SuggestionSource> = match &config.suggestion_webhook_url {
        Some(url) => Arc::new(
            WebhookSuggestionSource::new(url.clone(), config.suggestion_timeout)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?,
        ),
        None => {
            log::warn!("SUGGESTION_WEBHOOK_URL is not set; task suggestions are disabled");
            Arc::new(DisabledSuggestions)
        }
    };

    let state = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url)
                .await
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            store
                .migrate()
                .await
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            log::info!("Connected to PostgreSQL, migrations applied");
            AppState::new(Arc::new(store), suggestions, &config)
        }
        None => {
            log::warn!("DATABASE_URL is not set; using the in-memory store");
            AppState::new(Arc::new(MemoryStore::new()), suggestions, &config)
        }
    };

    let state = web::Data::new(state);
    log::info!("Starting taskboard server at {}", config.server_url());

    let server_config = config.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(cors(&server_config))
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(routes::config)
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .run()
    .await
}

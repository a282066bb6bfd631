pub mod auth;
pub mod health;
pub mod tasks;

use actix_web::web;

use crate::auth::AuthMiddleware;
use crate::error::{json_error_handler, path_error_handler};

/// Registers every route. Expects `web::Data<AppState>` on the app.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .app_data(web::PathConfig::default().error_handler(path_error_handler))
        .service(health::health)
        .service(
            web::scope("/api")
                .wrap(AuthMiddleware)
                .service(auth::login)
                .service(auth::register)
                .service(auth::logout)
                .service(auth::refresh_token)
                .service(
                    web::scope("/tasks")
                        .service(tasks::get_tasks)
                        .service(tasks::create_task)
                        .service(tasks::suggest_tasks)
                        .service(tasks::get_task)
                        .service(tasks::update_task)
                        .service(tasks::toggle_task)
                        .service(tasks::delete_task),
                ),
        )
        .service(
            web::scope("")
                .wrap(AuthMiddleware)
                .service(auth::login_page)
                .service(auth::login)
                .service(auth::register)
                .service(auth::logout),
        );
}

// specdriven-service/src/main.rs
use actix_cors::Cors;
use actix_web::{http::header, web, App, HttpServer};
use log::info;
use specdriven_service::routes::{
    auth_routes, collaborator_routes, invitation_routes, project_routes, spec_routes,
};
use specdriven_service::utils::auth_middleware::Authentication;
use specdriven_service::utils::config;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let address = config::bind_address();
    std::fs::create_dir_all("./storage")?;

    info!("🚀 Server starting at {}", address);

    HttpServer::new(|| {
        let cors = Cors::default()
            .allowed_origin(&config::frontend_url())
            .allow_any_method()
            .allow_any_header()
            .expose_headers(vec![header::AUTHORIZATION])
            .max_age(3600);

        App::new().wrap(cors).service(
            web::scope("/api")
                // register and login are open; everything else needs a token
                .configure(auth_routes::init_routes)
                .service(
                    web::scope("")
                        .wrap(Authentication)
                        .configure(auth_routes::init_session_routes)
                        .configure(project_routes::init_routes)
                        .configure(collaborator_routes::init_routes)
                        .configure(invitation_routes::init_routes)
                        .configure(spec_routes::init_routes),
                ),
        )
    })
    .bind(address)?
    .run()
    .await
}

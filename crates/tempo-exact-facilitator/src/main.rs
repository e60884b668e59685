use actix_cors::Cors;
use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};

use x402_facilitator::config::Config;
use x402_facilitator::state::AppState;
use x402_facilitator::{logging, routes};

fn build_cors(origins: &[String]) -> Cors {
    let cors = if origins.iter().any(|o| o == "*") {
        Cors::default().allow_any_origin()
    } else {
        origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };
    cors.allowed_methods(vec!["GET", "POST"])
        .allowed_headers(vec!["content-type", "authorization"])
        .max_age(3600)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            let _ = logging::init("info", false);
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };
    if let Err(e) = logging::init(&config.log_level, config.environment.is_development()) {
        eprintln!("failed to initialize logging: {e}");
    }

    let state = web::Data::new(AppState::from_config(&config));
    let sponsor = state.facilitator.sponsor_address();

    let governor_conf = GovernorConfigBuilder::default()
        .requests_per_minute(config.rate_limit_rpm)
        .finish()
        .ok_or_else(|| std::io::Error::other("failed to build rate limiter config"))?;

    tracing::info!(
        host = %config.host,
        port = config.port,
        environment = ?config.environment,
        network = %config.network,
        rpc = %config.rpc_url,
        "Tempo exact facilitator starting"
    );
    tracing::info!("Fee sponsor address: {sponsor}");
    tracing::info!("Rate limit: {} req/min per IP", config.rate_limit_rpm);
    tracing::info!("  GET  http://{}:{}/supported", config.host, config.port);
    tracing::info!("  POST http://{}:{}/verify", config.host, config.port);
    tracing::info!("  POST http://{}:{}/settle", config.host, config.port);

    let cors_origins = config.cors_allowed_origins.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(build_cors(&cors_origins))
            .wrap(Governor::new(&governor_conf))
            .app_data(state.clone())
            .app_data(web::PayloadConfig::new(65_536))
            .configure(routes::configure)
            .default_service(web::to(routes::not_found))
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}

use actix_web::{middleware, web, App, HttpServer};
use anyhow::Result;
use pet_classifier::config::{Settings, DEFAULT_CONFIG_FILE, DEFAULT_LOG_FILTER};
use pet_classifier::orchestrator::Orchestrator;
use pet_classifier::server::routes::{self, AppState};
use std::{env, process};
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: ./pet-classifier [config file]";

fn get_args() -> String {
    let args: Vec<String> = env::args().collect();
    match args.len() {
        1 => DEFAULT_CONFIG_FILE.to_string(),
        2 => args[1].clone(),
        _ => {
            println!("{USAGE}");
            process::exit(1);
        }
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let config_file = get_args();
    let settings = Settings::load(&config_file)?;
    info!(%config_file, ?settings, "loaded settings");

    let state = web::Data::new(AppState {
        orchestrator: Orchestrator::from_settings(&settings)?,
        max_upload_bytes: settings.server.max_upload_bytes,
    });

    let addr = (settings.server.host.clone(), settings.server.port);
    info!("listening on {}:{}", addr.0, addr.1);

    // Start the HTTP server
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .configure(routes::configure)
    })
    .bind(addr)?
    .run()
    .await?;

    Ok(())
}

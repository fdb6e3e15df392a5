// src/main.rs
use carton_fit::api::{self, ApiState};
use carton_fit::catalog::Catalog;
use carton_fit::config::{AppConfig, CatalogConfig};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn load_catalog(config: &CatalogConfig) -> Result<Catalog, carton_fit::catalog::CatalogError> {
    match config.path() {
        Some(path) if path.exists() => Catalog::load(path),
        Some(path) => {
            warn!(
                "⚠️ Catalog file {} does not exist yet; starting from the built-in catalog.",
                path.display()
            );
            Catalog::builtin()
        }
        None => Catalog::builtin(),
    }
}

#[tokio::main]
async fn main() {
    let dotenv_result = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = dotenv_result {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            warn!("⚠️ Could not load .env: {}", err);
        }
    }

    let app_config = AppConfig::from_env();

    let catalog = match load_catalog(&app_config.catalog) {
        Ok(catalog) => catalog,
        Err(err) => {
            error!("❌ Could not load the catalog: {}", err);
            std::process::exit(1);
        }
    };

    info!(
        "🚀 Carton fit service starting with {} containers...",
        catalog.len()
    );
    let state = ApiState::new(app_config.optimizer.clone(), catalog, &app_config.catalog);
    api::start_api_server(app_config.api.clone(), state).await;
}

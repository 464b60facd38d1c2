use std::sync::Arc;

use clap::Parser;
use miette::Result;
use tracing_subscriber::{fmt, EnvFilter};

use tribune::authz::rules;
use tribune::settings::Settings;
use tribune::storage::sql;
use tribune::web;

#[derive(Parser, Debug)]
#[command(
    name = "tribune",
    version,
    about = "Relationship-based access control for a Model UN conference platform"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Build and validate all rule modules, print a summary, and exit
    #[arg(long)]
    check_policies: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    let settings = Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    let registry = match rules::default_registry(&settings.authz) {
        Ok(registry) => registry,
        Err(e) => {
            tracing::error!(error = %e, "Rule registry is invalid");
            return Err(e.into());
        }
    };

    if cli.check_policies {
        println!(
            "{} rules in {} modules: {}",
            registry.rules().len(),
            registry.modules().len(),
            registry.modules().join(", ")
        );
        return Ok(());
    }

    let db = match &settings.database.url {
        Some(url) => {
            let db = sql::connect(url).await?;
            sql::create_tables(&db, registry.schema()).await?;
            Some(db)
        }
        None => None,
    };

    web::serve(settings, Arc::new(registry), db).await
}

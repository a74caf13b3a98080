use clap::Parser;
use database::DocumentStore;
use std::sync::Arc;

/// Application-scoped context shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DocumentStore>,
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Location of the document store.
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:cards.db")]
    pub database_url: String,

    #[arg(long, env = "PORT", default_value = "3000")]
    pub port: u16,
}

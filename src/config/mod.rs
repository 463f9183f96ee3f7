//! Application configuration, loaded from the environment.
//!
//! Variables use the `FORMFLOW` prefix with `__` between section and
//! key, e.g. `FORMFLOW__DATABASE__PATH=/var/lib/formflow.db`. A
//! `.env` file is honored when present.

mod cache;
mod database;
mod error;
mod generation;

use serde::Deserialize;

pub use cache::CacheConfig;
pub use database::DatabaseConfig;
pub use error::ConfigError;
pub use generation::GenerationConfig;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub generation: GenerationConfig,
}

impl AppConfig {
    /// Loads configuration from the environment and validates it.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config: AppConfig = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("FORMFLOW")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.cache.validate()?;
        self.generation.validate()?;
        Ok(())
    }
}

//! Carga de `MongoConfig` desde variables de entorno.

use crate::error::MongoInfraError;

/// Configuración de conexión a MongoDB, independiente del bounded context que
/// la consuma.
#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
    pub min_pool_size: Option<u32>,
    pub max_pool_size: Option<u32>,
    pub app_name: Option<String>,
    pub tls: Option<bool>,
}

impl MongoConfig {
    /// Lee `MONGO_URI` y `MONGO_DATABASE` (requeridas) y el resto de campos
    /// opcionales desde el entorno.
    pub fn from_env() -> Result<Self, MongoInfraError> {
        let uri = required_env("MONGO_URI")?;
        let database = required_env("MONGO_DATABASE")?;
        let min_pool_size = optional_env_u32("MONGO_MIN_POOL_SIZE")?;
        let max_pool_size = optional_env_u32("MONGO_MAX_POOL_SIZE")?;
        let app_name = std::env::var("MONGO_APP_NAME").ok();
        let tls = optional_env_bool("MONGO_TLS")?;

        Ok(Self {
            uri,
            database,
            min_pool_size,
            max_pool_size,
            app_name,
            tls,
        })
    }
}

fn required_env(name: &str) -> Result<String, MongoInfraError> {
    std::env::var(name).map_err(|_| MongoInfraError::MissingEnv(name.to_string()))
}

fn optional_env_u32(name: &str) -> Result<Option<u32>, MongoInfraError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse::<u32>()
            .map(Some)
            .map_err(|_| MongoInfraError::InvalidEnv { name: name.to_string(), value }),
        Err(_) => Ok(None),
    }
}

fn optional_env_bool(name: &str) -> Result<Option<bool>, MongoInfraError> {
    match std::env::var(name) {
        Ok(value) => match value.as_str() {
            "true" | "1" => Ok(Some(true)),
            "false" | "0" => Ok(Some(false)),
            _ => Err(MongoInfraError::InvalidEnv { name: name.to_string(), value }),
        },
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn missing_required_var_is_reported_by_name() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("MONGO_URI");
        std::env::remove_var("MONGO_DATABASE");
        let err = MongoConfig::from_env().unwrap_err();
        assert!(matches!(err, MongoInfraError::MissingEnv(name) if name == "MONGO_URI"));
    }

    #[test]
    fn parses_optional_pool_sizes_and_tls_flag() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("MONGO_URI", "mongodb://localhost:27017");
        std::env::set_var("MONGO_DATABASE", "twins");
        std::env::set_var("MONGO_MIN_POOL_SIZE", "2");
        std::env::set_var("MONGO_MAX_POOL_SIZE", "10");
        std::env::set_var("MONGO_TLS", "true");

        let config = MongoConfig::from_env().unwrap();
        assert_eq!(config.min_pool_size, Some(2));
        assert_eq!(config.max_pool_size, Some(10));
        assert_eq!(config.tls, Some(true));

        std::env::remove_var("MONGO_URI");
        std::env::remove_var("MONGO_DATABASE");
        std::env::remove_var("MONGO_MIN_POOL_SIZE");
        std::env::remove_var("MONGO_MAX_POOL_SIZE");
        std::env::remove_var("MONGO_TLS");
    }
}

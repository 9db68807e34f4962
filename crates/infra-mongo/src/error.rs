//! Errores de infraestructura MongoDB.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MongoInfraError {
    #[error("variable de entorno requerida ausente: {0}")]
    MissingEnv(String),

    #[error("variable de entorno con valor inválido: {name}={value}")]
    InvalidEnv { name: String, value: String },

    #[error("error de driver mongodb: {0}")]
    Driver(#[from] mongodb::error::Error),
}

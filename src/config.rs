//! Carga y gestión de configuración de la aplicación (servidor + almacén de envíos).

use std::env;
use anyhow::{anyhow, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Neo4j,
}

impl StorageBackend {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "neo4j" => Ok(Self::Neo4j),
            other => Err(anyhow!("Backend de almacenamiento no soportado: {other}")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Neo4j => "neo4j",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    pub storage: StorageBackend,
    /// Sólo presente (y obligatoria) con `STORAGE_BACKEND=neo4j`.
    pub neo4j: Option<Neo4jConfig>,
    /// Cuántos envíos recientes lee la analítica.
    pub responses_limit: usize,
    pub static_dir: String,
    pub open_browser: bool,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let server_addr = var("SERVER_ADDR").unwrap_or_else(|| "127.0.0.1:3322".to_string());

        let storage_str = var("STORAGE_BACKEND").unwrap_or_else(|| "memory".to_string());
        let storage = StorageBackend::from_str(&storage_str)?;

        let neo4j = match storage {
            StorageBackend::Neo4j => {
                let uri = var("NEO4J_URI").ok_or_else(|| anyhow!("Falta NEO4J_URI en el entorno"))?;
                let user = var("NEO4J_USER").ok_or_else(|| anyhow!("Falta NEO4J_USER en el entorno"))?;
                let password = var("NEO4J_PASSWORD")
                    .ok_or_else(|| anyhow!("Falta NEO4J_PASSWORD en el entorno"))?;
                Some(Neo4jConfig { uri, user, password })
            }
            StorageBackend::Memory => None,
        };

        let responses_limit = match var("RESPONSES_LIMIT") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|_| anyhow!("RESPONSES_LIMIT no es un número válido: {raw}"))?,
            None => 100,
        };

        let static_dir = var("STATIC_DIR").unwrap_or_else(|| "frontend".to_string());

        let open_browser = var("OPEN_BROWSER")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            server_addr,
            storage,
            neo4j,
            responses_limit,
            static_dir,
            open_browser,
        })
    }
}

use crate::config::AppConfig;
use anyhow::{anyhow, Result};
use neo4rs::{query, Graph};
use tracing::info;
use url::Url;

pub async fn connect_from_config(cfg: &AppConfig) -> Result<Graph> {
    let neo4j = cfg
        .neo4j
        .as_ref()
        .ok_or_else(|| anyhow!("Falta la configuración de Neo4j (NEO4J_URI, NEO4J_USER, NEO4J_PASSWORD)"))?;

    let url = Url::parse(&neo4j.uri)?;
    let host = url.host_str().unwrap_or("localhost");
    let port = url.port().unwrap_or(7687);
    let addr = format!("{host}:{port}");

    info!("Conectando a Neo4j en {addr}...");
    let graph = Graph::new(&addr, &neo4j.user, &neo4j.password).await?;
    info!("Conexión a Neo4j OK");
    Ok(graph)
}

/// Crea los constraints e índices usados por los envíos:
/// :Submission(id) único e índice por fecha de creación para el listado.
pub async fn ensure_schema(graph: &Graph) -> Result<()> {
    let statements = [
        "CREATE CONSTRAINT submission_id IF NOT EXISTS
         FOR (s:Submission)
         REQUIRE s.id IS UNIQUE",
        "CREATE INDEX submission_created_at IF NOT EXISTS
         FOR (s:Submission)
         ON (s.created_at)",
    ];

    for stmt in statements {
        graph.run(query(stmt)).await?;
    }

    info!("Esquema de Neo4j asegurado (constraint e índice de :Submission).");
    Ok(())
}

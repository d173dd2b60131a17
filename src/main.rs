// Módulos de la aplicación
mod analytics;
mod api;
mod app_state;
mod classifier;
mod config;
mod error;
mod models;
mod neo4j_client;
mod questions;
mod session;
mod store;

use crate::app_state::AppState;
use crate::questions::{build_graph, Category};
use axum::Router;
use tokio::sync::oneshot;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = config::AppConfig::from_env().expect("Error al cargar la configuración");

    // 3. Comprobar los grafos de preguntas antes de aceptar encuestas
    for category in Category::ALL {
        if let Err(e) = build_graph(category).validate() {
            error!("Grafo de preguntas '{}' no válido: {}", category, e);
            panic!("Grafo de preguntas '{category}' no válido: {e}");
        }
    }
    info!("Grafos de preguntas verificados ({} categorías).", Category::ALL.len());

    // 4. Conectar el almacén de envíos (memoria o Neo4j)
    let store = store::connect_store(&cfg)
        .await
        .expect("Error preparando el almacén de envíos");
    info!("Almacén de envíos: {}", store.backend());

    // Crear canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // 5. Crear estado compartido de la aplicación
    let app_state = AppState::new(cfg.clone(), store, Some(shutdown_tx));

    // 6. Configurar el router de la API y el servicio de ficheros estáticos
    let app = Router::new()
        .merge(api::create_router(app_state))
        .fallback_service(ServeDir::new(&cfg.static_dir))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 7. Iniciar el servidor
    let listener = tokio::net::TcpListener::bind(&cfg.server_addr)
        .await
        .expect("No se pudo abrir la dirección del servidor");
    let server_url = format!("http://{}", cfg.server_addr);
    info!("🚀 Servidor escuchando en {}", &server_url);

    if cfg.open_browser && webbrowser::open(&server_url).is_err() {
        info!("No se pudo abrir el navegador. Por favor, accede a {} manualmente.", server_url);
    }

    // Configurar el apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await
        .expect("Error en el servidor HTTP");

    info!("✅ Servidor cerrado correctamente.");
}

/// Pulto Engine WebSocket Server
///
/// Standalone server that exposes engine tables, streaming imports, and chart
/// recommendations to frontend clients over WebSocket.

use pulto_engine::config::ServerConfig;
use pulto_engine::server::run_server;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = ServerConfig::from_env()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    run_server(config).await
}

/// HTTP server with WebSocket support for real-time table updates
use actix_web::{middleware, web, App, Error, HttpRequest, HttpResponse, HttpServer};
use actix_web_actors::ws;

use crate::config::ServerConfig;
use crate::websocket::{forward_stream_events, AppState, TableWebSocket};

/// WebSocket endpoint handler
async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let resp = ws::start(TableWebSocket::new(state), &req, stream)?;
    Ok(resp)
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let streams = state
        .streams
        .lock()
        .map(|m| m.active_endpoints())
        .unwrap_or_default();
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "tables": state.tables.names(),
        "streams": streams,
    }))
}

/// Start the HTTP server with WebSocket support
pub async fn run_server(config: ServerConfig) -> std::io::Result<()> {
    let (state, events) = AppState::new(&config);
    let state = web::Data::new(state.with_demo_table());
    actix_web::rt::spawn(forward_stream_events(state.clone(), events));

    let (host, port) = config.bind_address();
    log::info!("websocket endpoint: ws://{}:{}/ws", host, port);
    log::info!("health check: http://{}:{}/health", host, port);
    log::info!("default poll interval: {:?}", config.default_poll_interval);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            // CORS for development
            .wrap(
                actix_cors::Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .route("/ws", web::get().to(ws_index))
            .route("/health", web::get().to(health_check))
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}

pub mod chat;
pub mod config_cmd;
pub mod gateway;
pub mod links;
pub mod memory;
pub mod models;

use memoria_agent::ChatService;
use memoria_config::AppConfig;

/// Load configuration and build the chat service the way the gateway does.
pub async fn load_service() -> Result<(AppConfig, ChatService), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let service = ChatService::from_config(&config).await?;
    tracing::debug!(
        backend = service.storage_backend(),
        models = config.models.len(),
        "Service loaded"
    );
    Ok((config, service))
}

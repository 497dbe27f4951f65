//! `memoria serve`: Start the HTTP API server.

use memoria_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("Memoria Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Storage:   {}", config.memory.backend);
    println!("   Models:    {}", config.models.len());
    if config.probe.enabled {
        println!("   Probe:     every {}s", config.probe.interval_secs);
    }

    memoria_gateway::start(config).await?;

    Ok(())
}

//! `filachat serve`: start the HTTP gateway.

use std::path::Path;

pub async fn run(
    explicit: Option<&Path>,
    port_override: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(explicit)?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("filachat gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:     {} ({})", config.default_model, config.default_provider);
    println!("   Tools:     {}", config.tools.url);

    filachat_gateway::start(config).await
}

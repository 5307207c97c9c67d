//! `filachat init`: first-time setup.

use filachat_config::AppConfig;
use std::path::Path;

pub fn run(explicit: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = super::config_path(explicit);

    println!("filachat setup");
    println!("==============\n");

    if let Some(dir) = config_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
            println!("Created config directory: {}", dir.display());
        }
    }

    if config_path.exists() && !force {
        println!("Config already exists at: {}", config_path.display());
        println!("Edit it manually or re-run with --force.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("Wrote config: {}", config_path.display());
    }

    let config = AppConfig::load_from(&config_path)?;
    if config.memory.backend != "memory" {
        let data_dir = config.memory.resolved_data_dir();
        std::fs::create_dir_all(&data_dir)?;
        println!("Session directory: {}", data_dir.display());
    }

    println!("\nNext steps:");
    println!("  1. Set FILACHAT_API_KEY (or GROQ_API_KEY), or add api_key to the config");
    println!("  2. Check [tools] url points at the queue tool service");
    println!("  3. Run `filachat chat` or `filachat serve`\n");

    Ok(())
}

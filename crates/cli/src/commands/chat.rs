//! `filachat chat`: interactive or single-message chat.

use filachat_core::SessionId;
use filachat_gateway::Runtime;
use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(
    explicit: Option<&Path>,
    message: Option<String>,
    session: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(explicit)?;

    if !config.has_api_key() && config.default_provider != "ollama" {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set FILACHAT_API_KEY (or GROQ_API_KEY), or add api_key to:");
        eprintln!("    {}", super::config_path(explicit).display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let runtime = Runtime::from_config(&config).await?;
    let orchestrator = runtime.orchestrator.clone();
    let session_id = SessionId::resolve(session.as_deref());

    if let Some(msg) = message {
        let reply = orchestrator.handle(Some(session_id.as_str()), &msg).await;
        println!("{}", reply.text);
        runtime.shutdown().await;
        return Ok(());
    }

    println!();
    println!("  filachat, interactive mode");
    println!();
    println!("  Provider:  {}", orchestrator.provider_name());
    println!("  Model:     {}", orchestrator.model());
    println!("  Session:   {session_id}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  Você > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit" | "sair") {
            break;
        }

        let reply = orchestrator.handle(Some(session_id.as_str()), line).await;
        println!();
        for text in reply.text.lines() {
            println!("  Assistente > {text}");
        }
        println!();
    }

    runtime.shutdown().await;
    println!();
    println!("  Até logo!");
    println!();
    Ok(())
}

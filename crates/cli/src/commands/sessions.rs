//! `filachat sessions` and `filachat reset`: inspect and clear stored sessions.

use filachat_config::AppConfig;
use filachat_core::SessionId;
use filachat_memory::{SessionStore, StoreConfig};
use std::path::Path;

async fn open_store(config: &AppConfig) -> Result<SessionStore, Box<dyn std::error::Error>> {
    let storage = filachat_memory::storage_from_config(&config.memory).await?;
    Ok(SessionStore::open(storage, StoreConfig::from(&config.memory)).await?)
}

pub async fn run(explicit: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(explicit)?;
    let store = open_store(&config).await?;
    let stats = store.stats().await;

    println!("Sessions ({} backend)", stats.backend);
    println!("  Active:        {}", stats.active_sessions);
    println!("  With name:     {}", stats.sessions_with_user_data);
    println!(
        "  Interactions:  {} ({:.1} per session)",
        stats.total_interactions, stats.average_interactions_per_session
    );
    println!("  Entities:      {}", stats.total_entities);
    if let (Some(oldest), Some(newest)) = (stats.oldest_activity, stats.newest_activity) {
        println!("  Activity:      {oldest} .. {newest}");
    }

    let ids = store.session_ids().await;
    if !ids.is_empty() {
        println!();
    }
    for id in ids {
        if let Some(session) = store.snapshot(&id).await {
            let name = session.profile.name.as_deref().unwrap_or("-");
            println!(
                "  {id}  interactions={}  entities={}  last={}  name={name}",
                session.interaction_count,
                session.completed.len(),
                session.last_activity.format("%Y-%m-%d %H:%M:%S"),
            );
        }
    }

    Ok(())
}

pub async fn reset(
    explicit: Option<&Path>,
    session: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(explicit)?;
    let store = open_store(&config).await?;

    if store.reset(&SessionId::from(session)).await? {
        println!("Session {session} removed");
    } else {
        println!("Session {session} not found");
    }
    Ok(())
}

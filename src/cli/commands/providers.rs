//! Providers command implementation
//!
//! Handles `aipo providers`: lists registered backends in fallback order,
//! optionally probing health and listing models.

use aipo_config::Config;
use aipo_llm::ProviderRegistry;
use aipo_utils::redaction::redact_error_message;
use anyhow::Result;

pub async fn execute_providers_command(health: bool, models: bool, config: &Config) -> Result<()> {
    let registry = ProviderRegistry::from_config(config)?;

    if registry.is_empty() {
        println!("No providers registered.");
        println!("  Set an API key (for example NANOGPT_API_KEY) or configure [llm] in .aipo/config.toml");
        return Ok(());
    }

    println!("Providers (fallback order):");
    for name in registry.names() {
        let Some(backend) = registry.get_client(&name) else {
            continue;
        };
        println!("  {name}");

        if health {
            let status = backend.health_check().await;
            let mark = if status.healthy { "✓ healthy" } else { "✗ unhealthy" };
            match status.detail {
                Some(detail) => println!(
                    "    {mark} ({} ms): {}",
                    status.latency_ms,
                    redact_error_message(&detail)
                ),
                None => println!("    {mark} ({} ms)", status.latency_ms),
            }
        }

        if models {
            match backend.list_models().await {
                Ok(list) if list.is_empty() => println!("    (no models reported)"),
                Ok(list) => {
                    for model in list {
                        println!("    - {model}");
                    }
                }
                Err(e) => println!(
                    "    models unavailable: {}",
                    redact_error_message(&e.to_string())
                ),
            }
        }
    }
    Ok(())
}

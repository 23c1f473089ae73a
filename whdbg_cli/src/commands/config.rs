//! Show or save the CLI configuration

use crate::config::{config_file, Config};
use anyhow::Result;
use console::style;

/// Print the effective configuration, writing it to the config file if `save`
pub fn run(config: &Config, save: bool) -> Result<()> {
    let path = config_file();

    println!(
        "{} {}",
        style("Config file:").dim(),
        style(path.display()).cyan()
    );
    println!(
        "{} {:?}",
        style("Environment:").dim(),
        config.environment
    );
    println!(
        "{} {}",
        style("Server URL: ").dim(),
        style(config.server_url()).green()
    );
    println!(
        "{} {}",
        style("Stream URL: ").dim(),
        style(config.websocket_url()).green()
    );
    println!(
        "{} {}s",
        style("Push timeout:").dim(),
        config.push_timeout().as_secs()
    );
    println!(
        "{} {}s",
        style("Max reconnect wait:").dim(),
        config.reconnect_max().as_secs()
    );

    if save {
        config.save()?;
        println!();
        println!("{} Saved to {}", style("✓").green(), path.display());
    }

    Ok(())
}

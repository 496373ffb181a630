//! Subcommand handlers.

use crate::ConfigAction;
use std::path::Path;

pub async fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".delve");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let default_config = delve_core::DelveConfig::default();
            let toml_str = toml::to_string_pretty(&default_config)?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = delve_core::config::load_config(Some(workspace), None)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
        ConfigAction::Path => {
            match delve_core::config::user_config_path() {
                Some(path) => println!("user:      {}", path.display()),
                None => println!("user:      (no home directory)"),
            }
            println!(
                "workspace: {}",
                workspace.join(".delve").join("config.toml").display()
            );
            if let Some(dir) = delve_core::config::default_log_dir() {
                println!("logs:      {}", dir.display());
            }
            Ok(())
        }
    }
}

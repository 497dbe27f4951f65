//! `memoria config`: Configuration management commands.

use memoria_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   Config parsed successfully");

            let mut warnings = Vec::new();

            if config.models.is_empty() {
                warnings.push("No models configured; every request will fail routing".to_string());
            }

            if config.memory.backend == "in_memory" {
                warnings.push("in_memory storage forgets everything on restart".to_string());
            }

            let declared: std::collections::BTreeSet<&str> = config
                .models
                .iter()
                .flat_map(|m| m.tags.iter().map(String::as_str))
                .collect();
            for category in ["coding", "complex_analysis", "simple", "general"] {
                if !declared.contains(category) {
                    warnings.push(format!(
                        "No model declares '{category}'; those requests go to the generic model"
                    ));
                }
            }

            if warnings.is_empty() {
                println!("   All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   warning: {w}");
                }
            }

            println!();
            println!("   Storage:   {}", config.memory.backend);
            println!("   Window:    {} turns / {} chars", config.context.max_turns, config.context.max_chars);
            println!("   Generic:   {}", config.router.generic_model);
            println!("   Models:    {}", config.models.len());
            println!(
                "   Gateway:   {}:{}",
                config.gateway.host, config.gateway.port
            );
        }
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", config_path().display());
    Ok(())
}

/// Write the default configuration unless a file already exists.
pub async fn init(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path();
    if path.exists() && !force {
        return Err(format!("{} already exists (use --force to overwrite)", path.display()).into());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, AppConfig::default_toml())?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn config_path() -> std::path::PathBuf {
    std::env::var("MEMORIA_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| AppConfig::config_dir().join("config.toml"))
}

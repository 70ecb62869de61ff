use anyhow::{Context, Result};

/// Generate configuration template
pub fn generate_config_template(template_type: &str, output: Option<&str>) -> Result<()> {
    let content = template_content(template_type)?;

    if let Some(path) = output {
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config template to {}", path))?;
        println!(
            "Generated {} configuration template: {}",
            template_type, path
        );
    } else {
        println!("{}", content);
    }

    Ok(())
}

fn template_content(template_type: &str) -> Result<&'static str> {
    match template_type {
        "tunnel" => Ok(include_str!("../../templates/tunnel-template.toml")),
        "forward" => Ok(include_str!("../../templates/forward-template.toml")),
        other => anyhow::bail!("Unknown template type: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_templates_are_valid_configs() {
        let tunnel = AppConfig::from_toml(template_content("tunnel").unwrap()).unwrap();
        assert_eq!(tunnel.mode(), "tunnel");

        let forward = AppConfig::from_toml(template_content("forward").unwrap()).unwrap();
        assert_eq!(forward.mode(), "forward");
    }

    #[test]
    fn test_unknown_template() {
        assert!(template_content("server").is_err());
    }
}

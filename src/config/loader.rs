use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use eyre::{Result, WrapErr};
use serde::Deserialize;

use crate::config::models::{SiteConfig, Template};

/// Name of the site config looked up next to the executable
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Prefix of environment variables overriding the site config (`WAFCTL_APIKEY`)
pub const ENV_PREFIX: &str = "WAFCTL";

/// `config.json` in the directory of the running executable
pub fn default_config_path() -> Result<PathBuf> {
    let exe = std::env::current_exe().wrap_err("Failed to locate the running executable")?;
    let dir = exe.parent().unwrap_or_else(|| Path::new("."));
    Ok(dir.join(DEFAULT_CONFIG_FILE))
}

#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    apikey: Option<String>,
}

/// Load the site config.
///
/// A missing file yields an empty config unless `required` is set. `WAFCTL_APIKEY`
/// overrides the key stored in the file.
pub fn load_site_config(config_path: &Path, required: bool) -> Result<SiteConfig> {
    load_site_config_with_env(config_path, required, Environment::with_prefix(ENV_PREFIX))
}

fn load_site_config_with_env(
    config_path: &Path,
    required: bool,
    environment: Environment,
) -> Result<SiteConfig> {
    let path_str = config_path
        .to_str()
        .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?;

    if !required && !config_path.exists() {
        tracing::debug!("No site config at {}, continuing without it", config_path.display());
    }

    let settings = Config::builder()
        .add_source(File::new(path_str, FileFormat::Json).required(required))
        .build()
        .wrap_err_with(|| {
            format!(
                "Unable to parse config file {}, please check its content",
                config_path.display()
            )
        })?;

    let mut site_config: SiteConfig = settings.try_deserialize().wrap_err_with(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    let overrides: EnvOverrides = Config::builder()
        .add_source(environment)
        .build()
        .and_then(|c| c.try_deserialize::<EnvOverrides>())
        .wrap_err("Failed to read WAFCTL_* environment overrides")?;

    if let Some(api_key) = overrides.apikey.filter(|k| !k.is_empty()) {
        tracing::debug!("API key taken from {ENV_PREFIX}_APIKEY");
        site_config.api_key = Some(api_key);
    }

    Ok(site_config)
}

/// Read and decode a template file
pub fn load_template(template_path: &Path) -> Result<Template> {
    let raw = std::fs::read_to_string(template_path).wrap_err_with(|| {
        format!(
            "Unable to read template file {}, check that it exists",
            template_path.display()
        )
    })?;

    let template: Template = serde_json::from_str(&raw).wrap_err_with(|| {
        format!(
            "Unable to parse template file {}, please check its content",
            template_path.display()
        )
    })?;

    tracing::debug!(
        "Loaded template {} ({} whitelist IPs, {} blacklist IPs, {} settings)",
        template_path.display(),
        template.whitelist_ips.len(),
        template.blacklist_ips.len(),
        template.settings.len()
    );

    Ok(template)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_load_site_config() {
        let json_content = r#"
{
  "apiKey": "0123456789abcdef",
  "sites": {
    "example.com": "site-secret"
  }
}
"#;

        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        write!(temp_file, "{}", json_content).unwrap();

        let config = load_site_config(temp_file.path(), true).unwrap();
        assert_eq!(config.secret_for("example.com"), Some("site-secret"));
        assert!(config.api_key.is_some());
    }

    fn env_with_api_key(value: &str) -> Environment {
        Environment::with_prefix(ENV_PREFIX).source(Some(
            [(format!("{ENV_PREFIX}_APIKEY"), value.to_string())]
                .into_iter()
                .collect(),
        ))
    }

    #[test]
    fn test_env_api_key_overrides_file_key() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        write!(temp_file, r#"{{ "apiKey": "file-key", "sites": {{}} }}"#).unwrap();

        let config =
            load_site_config_with_env(temp_file.path(), true, env_with_api_key("env-key"))
                .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("env-key"));

        let config =
            load_site_config_with_env(temp_file.path(), true, env_with_api_key("")).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("file-key"));
    }

    #[test]
    fn test_env_api_key_without_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_site_config_with_env(
            &dir.path().join("config.json"),
            false,
            env_with_api_key("env-key"),
        )
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("env-key"));
        assert!(config.sites.is_empty());
    }

    #[test]
    fn test_missing_optional_site_config_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_site_config(&dir.path().join("config.json"), false).unwrap();
        assert!(config.sites.is_empty());
    }

    #[test]
    fn test_missing_required_site_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_site_config(&dir.path().join("config.json"), true).is_err());
    }

    #[test]
    fn test_malformed_site_config_fails() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        write!(temp_file, "{{ \"sites\": ").unwrap();

        assert!(load_site_config(temp_file.path(), false).is_err());
    }

    #[test]
    fn test_load_template() {
        let json_content = r#"
{
  "whitelistIPs": ["200.0.0.1", "200.0.0.10"],
  "whitelistPaths": {"/wp-login.php": "equals"},
  "settings": {"cache_mode": "nocache"}
}
"#;

        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        write!(temp_file, "{}", json_content).unwrap();

        let template = load_template(temp_file.path()).unwrap();
        assert_eq!(template.whitelist_ips.len(), 2);
        assert_eq!(template.settings["cache_mode"], "nocache");
    }

    #[test]
    fn test_template_errors_name_the_failure() {
        let dir = tempfile::tempdir().unwrap();
        let missing = load_template(&dir.path().join("nope.json")).unwrap_err();
        assert!(format!("{missing}").contains("Unable to read"));

        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        write!(temp_file, "[1, 2").unwrap();
        let malformed = load_template(temp_file.path()).unwrap_err();
        assert!(format!("{malformed}").contains("Unable to parse"));
    }
}

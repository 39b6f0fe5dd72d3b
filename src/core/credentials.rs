//! Resolution of the API key and site secret.
//!
//! Sources are consulted in order: explicit flags, then the template, then the site
//! config (whose key may itself come from `WAFCTL_APIKEY`).

use thiserror::Error;

use crate::config::models::{Credentials, SiteConfig, Template};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error(
        "API key wasn't provided and was not found in the config file (use --key '<key>', or add \"apiKey\": \"<key>\" to the config file)"
    )]
    MissingApiKey,

    #[error("Only use {secret} or {site}, not both")]
    SecretAndSite {
        secret: &'static str,
        site: &'static str,
    },

    #[error("Site '{0}' not found in config file")]
    UnknownSite(String),

    #[error("No API secret or site was provided (use --secret or --site)")]
    MissingSecret,
}

/// Credential-related values offered by one source
#[derive(Debug, Clone, Default)]
pub struct CredentialLayer {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub site: Option<String>,
    secret_name: &'static str,
    site_name: &'static str,
}

impl CredentialLayer {
    /// Values given on the command line
    pub fn from_flags(
        api_key: Option<String>,
        api_secret: Option<String>,
        site: Option<String>,
    ) -> Self {
        Self {
            api_key,
            api_secret,
            site,
            secret_name: "--secret",
            site_name: "--site",
        }
    }

    /// Values carried by a template
    pub fn from_template(template: &Template) -> Self {
        Self {
            api_key: template.api_key.clone(),
            api_secret: template.api_secret.clone(),
            site: template.site.clone(),
            secret_name: "the template's apiSecret",
            site_name: "the template's site",
        }
    }

    /// Resolve this layer's secret, `None` if it offers neither a secret nor a site
    fn secret(&self, site_config: &SiteConfig) -> Result<Option<String>, CredentialError> {
        match (non_empty(&self.api_secret), non_empty(&self.site)) {
            (Some(_), Some(_)) => Err(CredentialError::SecretAndSite {
                secret: self.secret_name,
                site: self.site_name,
            }),
            (Some(secret), None) => Ok(Some(secret.to_string())),
            (None, Some(site)) => site_config
                .secret_for(site)
                .map(|secret| {
                    tracing::debug!("Using API secret of site '{site}' from config file");
                    Some(secret.to_string())
                })
                .ok_or_else(|| CredentialError::UnknownSite(site.to_string())),
            (None, None) => Ok(None),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Pick the API key and secret following flag > template > config precedence
pub fn resolve_credentials(
    flags: &CredentialLayer,
    template: Option<&CredentialLayer>,
    site_config: &SiteConfig,
) -> Result<Credentials, CredentialError> {
    let api_key = non_empty(&flags.api_key)
        .or_else(|| template.and_then(|t| non_empty(&t.api_key)))
        .or_else(|| non_empty(&site_config.api_key))
        .ok_or(CredentialError::MissingApiKey)?
        .to_string();

    let api_secret = match flags.secret(site_config)? {
        Some(secret) => secret,
        None => template
            .map(|t| t.secret(site_config))
            .transpose()?
            .flatten()
            .ok_or(CredentialError::MissingSecret)?,
    };

    Ok(Credentials {
        api_key,
        api_secret,
    })
}

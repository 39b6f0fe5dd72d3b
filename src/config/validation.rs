use std::net::IpAddr;

use crate::{
    config::models::{PathPattern, Template},
    core::{
        plan::{ChangeSet, PathRule},
        settings,
        subnet::{Ipv4Network, SubnetError},
    },
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid IP address in {field}: '{value}'")]
    InvalidIp { field: String, value: String },

    #[error("Invalid subnet in {field}: {source}")]
    InvalidSubnet {
        field: String,
        #[source]
        source: SubnetError,
    },

    #[error("Invalid path in {field}: '{path}': {message}")]
    InvalidPath {
        field: String,
        path: String,
        message: String,
    },

    #[error("Invalid setting in {field}: {message}")]
    InvalidSetting { field: String, message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Collects typed changes from raw input, remembering every problem on the way so
/// the user sees all of them at once.
#[derive(Debug, Default)]
pub struct ChangeSetBuilder {
    changes: ChangeSet,
    errors: Vec<ValidationError>,
}

impl ChangeSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_ip(&mut self, field: &str, raw: &str) -> Option<IpAddr> {
        match raw.trim().parse::<IpAddr>() {
            Ok(ip) => Some(ip),
            Err(_) => {
                self.errors.push(ValidationError::InvalidIp {
                    field: field.to_string(),
                    value: raw.to_string(),
                });
                None
            }
        }
    }

    fn parse_subnet(&mut self, field: &str, raw: &str) -> Option<Ipv4Network> {
        match Ipv4Network::parse(raw) {
            Ok(network) => Some(network),
            Err(source) => {
                self.errors.push(ValidationError::InvalidSubnet {
                    field: field.to_string(),
                    source,
                });
                None
            }
        }
    }

    fn parse_path(&mut self, field: &str, path: &str, pattern: &str) -> Option<PathRule> {
        let path = path.trim();
        if !path.starts_with('/') {
            self.errors.push(ValidationError::InvalidPath {
                field: field.to_string(),
                path: path.to_string(),
                message: "URL paths must start with '/'".to_string(),
            });
            return None;
        }
        match pattern.parse::<PathPattern>() {
            Ok(pattern) => Some(PathRule {
                path: path.to_string(),
                pattern,
            }),
            Err(message) => {
                self.errors.push(ValidationError::InvalidPath {
                    field: field.to_string(),
                    path: path.to_string(),
                    message,
                });
                None
            }
        }
    }

    pub fn whitelist_ip(&mut self, field: &str, raw: &str) -> &mut Self {
        if let Some(ip) = self.parse_ip(field, raw) {
            self.changes.whitelist_ips.push(ip);
        }
        self
    }

    pub fn blacklist_ip(&mut self, field: &str, raw: &str) -> &mut Self {
        if let Some(ip) = self.parse_ip(field, raw) {
            self.changes.blacklist_ips.push(ip);
        }
        self
    }

    pub fn whitelist_subnet(&mut self, field: &str, raw: &str) -> &mut Self {
        if let Some(network) = self.parse_subnet(field, raw) {
            self.changes.whitelist_subnets.push(network);
        }
        self
    }

    pub fn blacklist_subnet(&mut self, field: &str, raw: &str) -> &mut Self {
        if let Some(network) = self.parse_subnet(field, raw) {
            self.changes.blacklist_subnets.push(network);
        }
        self
    }

    pub fn whitelist_path(&mut self, field: &str, path: &str, pattern: &str) -> &mut Self {
        if let Some(rule) = self.parse_path(field, path, pattern) {
            self.changes.whitelist_paths.push(rule);
        }
        self
    }

    pub fn blacklist_path(&mut self, field: &str, path: &str, pattern: &str) -> &mut Self {
        if let Some(rule) = self.parse_path(field, path, pattern) {
            self.changes.blacklist_paths.push(rule);
        }
        self
    }

    pub fn setting(&mut self, field: &str, name: &str, value: &str) -> &mut Self {
        let name = name.trim();
        if name.is_empty() {
            self.errors.push(ValidationError::InvalidSetting {
                field: field.to_string(),
                message: "setting name cannot be empty".to_string(),
            });
            return self;
        }
        if value.is_empty() {
            self.errors.push(ValidationError::InvalidSetting {
                field: field.to_string(),
                message: format!("setting '{name}' has an empty value"),
            });
            return self;
        }

        match settings::lookup(name) {
            None => tracing::warn!("Setting '{name}' is not a known WAF setting, sending it anyway"),
            Some(info) if !info.values.is_empty() && !info.values.contains(&value) => {
                tracing::warn!(
                    "Value '{value}' for setting '{name}' is not one of: {}",
                    info.values.join(", ")
                );
            }
            Some(_) => {}
        }

        self.changes
            .settings
            .push((name.to_string(), value.to_string()));
        self
    }

    /// Finish, failing with every collected problem
    pub fn build(self) -> ValidationResult<ChangeSet> {
        let mut errors = self.errors;
        match errors.len() {
            0 => Ok(self.changes),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::ValidationFailed {
                message: format_multiple_errors(&errors),
            }),
        }
    }
}

/// Template validator
pub struct TemplateValidator;

impl TemplateValidator {
    /// Validate a template and convert it into typed changes
    pub fn validate(template: &Template) -> ValidationResult<ChangeSet> {
        let mut builder = ChangeSetBuilder::new();

        for ip in &template.whitelist_ips {
            builder.whitelist_ip("whitelistIPs", ip);
        }
        for subnet in &template.whitelist_subnets {
            builder.whitelist_subnet("whitelistSubnets", subnet);
        }
        for ip in &template.blacklist_ips {
            builder.blacklist_ip("blacklistIPs", ip);
        }
        for subnet in &template.blacklist_subnets {
            builder.blacklist_subnet("blacklistSubnets", subnet);
        }
        for (path, pattern) in &template.whitelist_paths {
            builder.whitelist_path("whitelistPaths", path, pattern);
        }
        for (path, pattern) in &template.blacklist_paths {
            builder.blacklist_path("blacklistPaths", path, pattern);
        }
        for (name, value) in &template.settings {
            builder.setting("settings", name, value);
        }

        builder.build()
    }
}

/// Format multiple validation errors into a single message
fn format_multiple_errors(errors: &[ValidationError]) -> String {
    let mut message = format!("Found {} validation errors:\n", errors.len());
    for (i, error) in errors.iter().enumerate() {
        message.push_str(&format!("  {}. {}\n", i + 1, error));
    }
    message
}

//! Turning desired changes into the list of WAF requests to submit.

use std::{collections::HashSet, fmt, net::IpAddr};

use crate::{
    config::models::PathPattern,
    core::subnet::{Ipv4Network, SubnetError, expand_subnets},
};

/// A URL path together with the way the WAF should match it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathRule {
    pub path: String,
    pub pattern: PathPattern,
}

impl fmt::Display for PathRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path, self.pattern)
    }
}

/// Split a `path[:pattern]` flag value. The pattern defaults to `matches`.
///
/// Only a trailing `:<pattern>` naming a known pattern is split off, so paths may contain `:`.
pub fn split_path_spec(spec: &str) -> (&str, &str) {
    match spec.rsplit_once(':') {
        Some((path, pattern)) if pattern.parse::<PathPattern>().is_ok() => (path, pattern),
        _ => (spec, PathPattern::default().as_str()),
    }
}

/// Desired changes from a single source (flags or template), already validated
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub whitelist_ips: Vec<IpAddr>,
    pub whitelist_subnets: Vec<Ipv4Network>,
    pub blacklist_ips: Vec<IpAddr>,
    pub blacklist_subnets: Vec<Ipv4Network>,
    pub whitelist_paths: Vec<PathRule>,
    pub blacklist_paths: Vec<PathRule>,
    /// Setting updates in the order they were given
    pub settings: Vec<(String, String)>,
}

impl ChangeSet {
    fn subnets(&self) -> impl Iterator<Item = &Ipv4Network> {
        self.whitelist_subnets
            .iter()
            .chain(self.blacklist_subnets.iter())
    }
}

/// One request against the WAF management API
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WafAction {
    WhitelistIp { ip: IpAddr, delete: bool },
    BlacklistIp { ip: IpAddr, delete: bool },
    WhitelistPath { rule: PathRule, delete: bool },
    BlacklistPath { rule: PathRule, delete: bool },
    UpdateSetting { name: String, value: String },
    ShowSettings,
}

impl WafAction {
    /// Short name used in logs and reports
    pub fn name(&self) -> &'static str {
        match self {
            WafAction::WhitelistIp { delete: false, .. } => "whitelist_ip",
            WafAction::WhitelistIp { delete: true, .. } => "delete_whitelist_ip",
            WafAction::BlacklistIp { delete: false, .. } => "blacklist_ip",
            WafAction::BlacklistIp { delete: true, .. } => "delete_blacklist_ip",
            WafAction::WhitelistPath { delete: false, .. } => "whitelist_path",
            WafAction::WhitelistPath { delete: true, .. } => "delete_whitelist_path",
            WafAction::BlacklistPath { delete: false, .. } => "blacklist_path",
            WafAction::BlacklistPath { delete: true, .. } => "delete_blacklist_path",
            WafAction::UpdateSetting { .. } => "update_setting",
            WafAction::ShowSettings => "show_settings",
        }
    }

    /// What the action applies to
    pub fn target(&self) -> String {
        match self {
            WafAction::WhitelistIp { ip, .. } | WafAction::BlacklistIp { ip, .. } => ip.to_string(),
            WafAction::WhitelistPath { rule, .. } | WafAction::BlacklistPath { rule, .. } => {
                rule.to_string()
            }
            WafAction::UpdateSetting { name, value } => format!("{name}={value}"),
            WafAction::ShowSettings => String::new(),
        }
    }
}

impl WafAction {
    /// The same action with `delete` cleared, identifying the list entry it touches
    fn without_delete(&self) -> WafAction {
        match self {
            WafAction::WhitelistIp { ip, .. } => WafAction::WhitelistIp {
                ip: *ip,
                delete: false,
            },
            WafAction::BlacklistIp { ip, .. } => WafAction::BlacklistIp {
                ip: *ip,
                delete: false,
            },
            WafAction::WhitelistPath { rule, .. } => WafAction::WhitelistPath {
                rule: rule.clone(),
                delete: false,
            },
            WafAction::BlacklistPath { rule, .. } => WafAction::BlacklistPath {
                rule: rule.clone(),
                delete: false,
            },
            other => other.clone(),
        }
    }
}

impl fmt::Display for WafAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WafAction::ShowSettings => f.write_str(self.name()),
            _ => write!(f, "{} {}", self.name(), self.target()),
        }
    }
}

/// Ordered, duplicate-free list of actions for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    actions: Vec<WafAction>,
}

impl Plan {
    /// Merge flag-sourced and template-sourced changes.
    ///
    /// `delete` only applies to flag-sourced IPs and paths; template entries are always
    /// added and settings can only be updated. A setting given by flag wins over the
    /// same setting in the template.
    pub fn build(
        flags: &ChangeSet,
        template: Option<&ChangeSet>,
        delete: bool,
        max_subnet_hosts: u64,
    ) -> Result<Self, SubnetError> {
        let total_hosts: u64 = flags
            .subnets()
            .chain(template.into_iter().flat_map(ChangeSet::subnets))
            .map(Ipv4Network::host_count)
            .sum();
        if total_hosts > max_subnet_hosts {
            return Err(SubnetError::TooManyHosts {
                hosts: total_hosts,
                limit: max_subnet_hosts,
            });
        }

        let mut plan = Plan::default();
        let mut seen = HashSet::new();

        plan.push_lists(flags, delete, &mut seen)?;
        if let Some(template) = template {
            plan.push_lists(template, false, &mut seen)?;
        }

        let mut settings: Vec<(String, String)> = Vec::new();
        for (name, value) in &flags.settings {
            match settings.iter_mut().find(|(n, _)| n == name) {
                Some(existing) => existing.1 = value.clone(),
                None => settings.push((name.clone(), value.clone())),
            }
        }
        for (name, value) in template.map(|t| t.settings.as_slice()).unwrap_or_default() {
            if settings.iter().any(|(n, _)| n == name) {
                tracing::debug!("Setting '{name}' from the template is overridden by a flag");
                continue;
            }
            settings.push((name.clone(), value.clone()));
        }
        for (name, value) in settings {
            plan.push(WafAction::UpdateSetting { name, value }, &mut seen);
        }

        Ok(plan)
    }

    fn push_lists(
        &mut self,
        changes: &ChangeSet,
        delete: bool,
        seen: &mut HashSet<WafAction>,
    ) -> Result<(), SubnetError> {
        let whitelist_hosts = expand_subnets(&changes.whitelist_subnets, u64::MAX)?;
        let blacklist_hosts = expand_subnets(&changes.blacklist_subnets, u64::MAX)?;

        for ip in changes
            .whitelist_ips
            .iter()
            .copied()
            .chain(whitelist_hosts.into_iter().map(IpAddr::V4))
        {
            self.push(WafAction::WhitelistIp { ip, delete }, seen);
        }
        for ip in changes
            .blacklist_ips
            .iter()
            .copied()
            .chain(blacklist_hosts.into_iter().map(IpAddr::V4))
        {
            self.push(WafAction::BlacklistIp { ip, delete }, seen);
        }
        for rule in &changes.whitelist_paths {
            self.push(
                WafAction::WhitelistPath {
                    rule: rule.clone(),
                    delete,
                },
                seen,
            );
        }
        for rule in &changes.blacklist_paths {
            self.push(
                WafAction::BlacklistPath {
                    rule: rule.clone(),
                    delete,
                },
                seen,
            );
        }
        Ok(())
    }

    /// Keep the first request for each list entry. A later request that adds what an earlier
    /// one deletes (or the reverse) is dropped, so flags win over the template.
    fn push(&mut self, action: WafAction, seen: &mut HashSet<WafAction>) {
        if seen.insert(action.without_delete()) {
            self.actions.push(action);
        } else if self.actions.contains(&action) {
            tracing::debug!("Skipping duplicate request: {action}");
        } else {
            tracing::warn!("Dropping '{action}': it conflicts with an earlier request for the same entry");
        }
    }

    pub fn actions(&self) -> &[WafAction] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl From<Vec<WafAction>> for Plan {
    fn from(actions: Vec<WafAction>) -> Self {
        let mut plan = Plan::default();
        let mut seen = HashSet::new();
        for action in actions {
            plan.push(action, &mut seen);
        }
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().expect("valid ip")
    }

    fn net(s: &str) -> Ipv4Network {
        s.parse().expect("valid network")
    }

    #[test]
    fn test_flag_delete_does_not_touch_template_entries() {
        let flags = ChangeSet {
            whitelist_ips: vec![ip("200.0.0.1")],
            ..ChangeSet::default()
        };
        let template = ChangeSet {
            whitelist_ips: vec![ip("200.0.0.2")],
            ..ChangeSet::default()
        };

        let plan = Plan::build(&flags, Some(&template), true, 16).unwrap();
        assert_eq!(
            plan.actions(),
            &[
                WafAction::WhitelistIp {
                    ip: ip("200.0.0.1"),
                    delete: true
                },
                WafAction::WhitelistIp {
                    ip: ip("200.0.0.2"),
                    delete: false
                },
            ]
        );
    }

    #[test]
    fn test_flag_delete_wins_over_template_add_of_same_entry() {
        let rule = PathRule {
            path: "/wp-login.php".to_string(),
            pattern: PathPattern::Equals,
        };
        let flags = ChangeSet {
            whitelist_ips: vec![ip("1.2.3.4")],
            blacklist_subnets: vec![net("10.0.0.0/30")],
            whitelist_paths: vec![rule.clone()],
            ..ChangeSet::default()
        };
        let template = ChangeSet {
            whitelist_ips: vec![ip("1.2.3.4")],
            blacklist_ips: vec![ip("10.0.0.2"), ip("10.0.0.9")],
            whitelist_paths: vec![rule.clone()],
            ..ChangeSet::default()
        };

        let plan = Plan::build(&flags, Some(&template), true, 16).unwrap();
        let rendered: Vec<_> = plan.actions().iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "delete_whitelist_ip 1.2.3.4",
                "delete_blacklist_ip 10.0.0.1",
                "delete_blacklist_ip 10.0.0.2",
                "delete_whitelist_path /wp-login.php (equals)",
                "blacklist_ip 10.0.0.9",
            ]
        );
    }

    #[test]
    fn test_same_target_in_other_list_is_not_a_conflict() {
        let flags = ChangeSet {
            whitelist_ips: vec![ip("1.2.3.4")],
            ..ChangeSet::default()
        };
        let template = ChangeSet {
            blacklist_ips: vec![ip("1.2.3.4")],
            ..ChangeSet::default()
        };

        let plan = Plan::build(&flags, Some(&template), true, 16).unwrap();
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_subnets_expand_after_plain_ips_and_dedupe() {
        let flags = ChangeSet {
            blacklist_ips: vec![ip("10.0.0.1")],
            blacklist_subnets: vec![net("10.0.0.0/30")],
            ..ChangeSet::default()
        };

        let plan = Plan::build(&flags, None, false, 16).unwrap();
        let targets: Vec<_> = plan.actions().iter().map(WafAction::target).collect();
        assert_eq!(targets, vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn test_flag_settings_override_template_settings() {
        let flags = ChangeSet {
            settings: vec![
                ("cache_mode".to_string(), "nocache".to_string()),
                ("cache_mode".to_string(), "docache".to_string()),
            ],
            ..ChangeSet::default()
        };
        let template = ChangeSet {
            settings: vec![
                ("cache_mode".to_string(), "sitecache".to_string()),
                ("force_https".to_string(), "https".to_string()),
            ],
            ..ChangeSet::default()
        };

        let plan = Plan::build(&flags, Some(&template), false, 16).unwrap();
        assert_eq!(
            plan.actions(),
            &[
                WafAction::UpdateSetting {
                    name: "cache_mode".to_string(),
                    value: "docache".to_string()
                },
                WafAction::UpdateSetting {
                    name: "force_https".to_string(),
                    value: "https".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_subnet_limit_counts_both_sources() {
        let flags = ChangeSet {
            whitelist_subnets: vec![net("200.0.0.0/29")],
            ..ChangeSet::default()
        };
        let template = ChangeSet {
            blacklist_subnets: vec![net("200.0.1.0/29")],
            ..ChangeSet::default()
        };

        assert!(Plan::build(&flags, Some(&template), false, 12).is_ok());
        assert_eq!(
            Plan::build(&flags, Some(&template), false, 11),
            Err(SubnetError::TooManyHosts {
                hosts: 12,
                limit: 11
            })
        );
    }

    #[test]
    fn test_empty_inputs_give_empty_plan() {
        let plan = Plan::build(&ChangeSet::default(), None, true, 16).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_split_path_spec() {
        assert_eq!(split_path_spec("/wp-admin"), ("/wp-admin", "matches"));
        assert_eq!(
            split_path_spec("/wp-admin:begins_with"),
            ("/wp-admin", "begins_with")
        );
    }

    #[test]
    fn test_split_path_spec_keeps_colons_in_path() {
        assert_eq!(split_path_spec("/a:b"), ("/a:b", "matches"));
        assert_eq!(split_path_spec("/a:b:equals"), ("/a:b", "equals"));
        assert_eq!(split_path_spec("/feed:"), ("/feed:", "matches"));
    }

    #[test]
    fn test_action_display() {
        let action = WafAction::BlacklistPath {
            rule: PathRule {
                path: "/xmlrpc.php".to_string(),
                pattern: PathPattern::Equals,
            },
            delete: true,
        };
        assert_eq!(
            action.to_string(),
            "delete_blacklist_path /xmlrpc.php (equals)"
        );
        assert_eq!(WafAction::ShowSettings.to_string(), "show_settings");
    }
}

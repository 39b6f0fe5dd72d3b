//! Catalog of WAF settings understood by `update_setting`.
//!
//! The remote API stays the authority on what it accepts; the catalog only feeds the
//! `settings-help` output and warnings about names it has never heard of.

use std::fmt::Write as _;

/// A known WAF setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingInfo {
    pub name: &'static str,
    pub description: &'static str,
    /// Accepted values, empty when the value is free-form
    pub values: &'static [&'static str],
}

pub const KNOWN_SETTINGS: &[SettingInfo] = &[
    SettingInfo {
        name: "internal_ip_main",
        description: "Hosting (origin) IP address the firewall forwards traffic to",
        values: &[],
    },
    SettingInfo {
        name: "internal_ip_alternate",
        description: "Alternate origin IP address used for load balancing",
        values: &[],
    },
    SettingInfo {
        name: "cache_mode",
        description: "Caching level applied to the site",
        values: &["docache", "sitecache", "nocache", "nocacheatall"],
    },
    SettingInfo {
        name: "admin_access",
        description: "Restrict access to admin panels to whitelisted IPs",
        values: &["restricted", "open"],
    },
    SettingInfo {
        name: "force_https",
        description: "Protocol the firewall redirects visitors to",
        values: &["http", "https", "null"],
    },
    SettingInfo {
        name: "force_sec_headers",
        description: "Security headers added to responses",
        values: &["disabled", "enabled", "enabledhsts", "enabledhstsfull"],
    },
    SettingInfo {
        name: "unfiltered_html",
        description: "Allow or block unfiltered HTML in requests",
        values: &["allow_unfilter", "block_unfilter"],
    },
    SettingInfo {
        name: "block_php_upload",
        description: "Allow or block uploads of PHP files",
        values: &["allow_uploads", "block_uploads"],
    },
    SettingInfo {
        name: "detect_adv_evasion",
        description: "Advanced evasion detection",
        values: &["enabled", "disabled"],
    },
    SettingInfo {
        name: "aggressive_bot_filter",
        description: "Aggressive filtering of bots",
        values: &["enabled", "disabled"],
    },
    SettingInfo {
        name: "http_flood_protection",
        description: "HTTP flood protection",
        values: &["js_filter", "disabled"],
    },
    SettingInfo {
        name: "compression_mode",
        description: "Compress responses served by the firewall",
        values: &["enabled", "disabled"],
    },
    SettingInfo {
        name: "behind_cdn",
        description: "CDN placed in front of the firewall",
        values: &[
            "none",
            "behind_akamai",
            "behind_cloudflare",
            "behind_maxcdn",
            "behind_cdn",
        ],
    },
    SettingInfo {
        name: "max_upload_size",
        description: "Maximum request body size, e.g. 10m",
        values: &[],
    },
];

/// Find a known setting by name
pub fn lookup(name: &str) -> Option<&'static SettingInfo> {
    KNOWN_SETTINGS.iter().find(|s| s.name == name)
}

/// Render the `settings-help` text
pub fn help_text() -> String {
    let width = KNOWN_SETTINGS
        .iter()
        .map(|s| s.name.len())
        .max()
        .unwrap_or(0);

    let mut out = String::from("Settings accepted by --setting NAME=VALUE and the template \"settings\" map:\n\n");
    for setting in KNOWN_SETTINGS {
        let _ = writeln!(out, "  {:width$}  {}", setting.name, setting.description);
        if !setting.values.is_empty() {
            let _ = writeln!(out, "  {:width$}  values: {}", "", setting.values.join(", "));
        }
    }
    out.push_str(
        "\nSettings can only be updated. --delete applies to whitelisted/blacklisted entries.\n",
    );
    out
}

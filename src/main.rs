use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{WrapErr, eyre},
};
use tracing::Instrument;
use wafctl::{
    ChangeSetBuilder, Executor, Plan, RunReport, SiteConfig, SucuriClient, Template,
    TemplateValidator, WafAction, WafApi,
    config::{self, ValidationResult},
    core::{
        ChangeSet, CredentialLayer, DEFAULT_MAX_SUBNET_HOSTS, Ipv4Network, plan::split_path_spec,
        resolve_credentials, settings, subnet::expand_subnets,
    },
    tracing_setup::{self, LogFormat},
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(flatten)]
    apply: ApplyArgs,

    /// Log level or filter directive (RUST_LOG takes precedence)
    #[clap(long, global = true, default_value = "info")]
    log_level: String,

    /// Log output format
    #[clap(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Parser, Debug)]
enum Commands {
    /// List the WAF settings that can be updated
    SettingsHelp,
    /// Print the current settings of a site
    ShowSettings {
        #[clap(flatten)]
        credentials: CredentialArgs,

        #[clap(flatten)]
        api: ApiArgs,
    },
    /// Print the usable host addresses of one or more subnets
    Expand {
        /// Subnets in CIDR notation, e.g. 200.0.0.0/27
        #[clap(required = true, value_delimiter = ',')]
        subnets: Vec<String>,

        /// Refuse to expand into more hosts than this
        #[clap(long, default_value_t = DEFAULT_MAX_SUBNET_HOSTS)]
        max_subnet_hosts: u64,
    },
    /// Check a template file without contacting the API
    Validate {
        /// Template file to validate
        #[clap(short, long)]
        template: PathBuf,
    },
}

#[derive(clap::Args, Debug, Clone)]
struct CredentialArgs {
    /// API key (falls back to the template, then to "apiKey" in the config file)
    #[clap(long)]
    key: Option<String>,

    /// API secret of the site
    #[clap(long, conflicts_with = "site")]
    secret: Option<String>,

    /// Site whose secret is stored in the config file
    #[clap(long)]
    site: Option<String>,

    /// Site config file [default: config.json next to the executable]
    #[clap(short, long)]
    config: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Clone)]
struct ApiArgs {
    /// WAF API endpoint
    #[clap(long, default_value = wafctl::DEFAULT_API_URL)]
    api_url: String,

    /// Timeout of each API request, e.g. 30s or 1m
    #[clap(long, default_value = "30s")]
    timeout: humantime::Duration,
}

#[derive(clap::Args, Debug, Clone)]
struct ApplyArgs {
    #[clap(flatten)]
    credentials: CredentialArgs,

    #[clap(flatten)]
    api: ApiArgs,

    /// Template describing whitelists, blacklists and settings to apply
    #[clap(short, long)]
    template: Option<PathBuf>,

    /// IPs to whitelist, e.g. 200.0.0.1,200.0.0.10
    #[clap(long, alias = "whitelistIP", value_delimiter = ',')]
    whitelist_ip: Vec<String>,

    /// Subnets whose hosts are whitelisted, e.g. 200.0.0.0/27,200.0.1.0/30
    #[clap(long, alias = "whitelistSubnet", value_delimiter = ',')]
    whitelist_subnet: Vec<String>,

    /// IPs to blacklist
    #[clap(long, alias = "blacklistIP", value_delimiter = ',')]
    blacklist_ip: Vec<String>,

    /// Subnets whose hosts are blacklisted
    #[clap(long, alias = "blacklistSubnet", value_delimiter = ',')]
    blacklist_subnet: Vec<String>,

    /// URL paths to whitelist as PATH[:PATTERN]; PATTERN is matches, begins_with, ends_with or equals
    #[clap(long, value_delimiter = ',')]
    whitelist_path: Vec<String>,

    /// URL paths to blacklist as PATH[:PATTERN]
    #[clap(long, value_delimiter = ',')]
    blacklist_path: Vec<String>,

    /// Setting to update as NAME=VALUE (repeatable, see `settings-help`)
    #[clap(long, value_parser = parse_setting)]
    setting: Vec<(String, String)>,

    /// Remove the given IPs, subnets and paths instead of adding them (settings can't be removed)
    #[clap(long)]
    delete: bool,

    /// Print the requests that would be sent without sending them
    #[clap(long)]
    dry_run: bool,

    /// Maximum requests in flight, 0 sends all at once
    #[clap(long, default_value_t = 0)]
    concurrency: usize,

    /// Refuse to expand subnets into more hosts than this
    #[clap(long, default_value_t = DEFAULT_MAX_SUBNET_HOSTS)]
    max_subnet_hosts: u64,
}

fn parse_setting(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.to_string()))
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))
}

fn load_site_config(args: &CredentialArgs) -> Result<SiteConfig> {
    match &args.config {
        Some(path) => config::load_site_config(path, true),
        None => config::load_site_config(&config::default_config_path()?, false),
    }
}

fn flag_layer(args: &CredentialArgs) -> CredentialLayer {
    CredentialLayer::from_flags(args.key.clone(), args.secret.clone(), args.site.clone())
}

fn flag_changes(args: &ApplyArgs) -> ValidationResult<ChangeSet> {
    let mut builder = ChangeSetBuilder::new();
    for ip in &args.whitelist_ip {
        builder.whitelist_ip("--whitelist-ip", ip);
    }
    for subnet in &args.whitelist_subnet {
        builder.whitelist_subnet("--whitelist-subnet", subnet);
    }
    for ip in &args.blacklist_ip {
        builder.blacklist_ip("--blacklist-ip", ip);
    }
    for subnet in &args.blacklist_subnet {
        builder.blacklist_subnet("--blacklist-subnet", subnet);
    }
    for spec in &args.whitelist_path {
        let (path, pattern) = split_path_spec(spec);
        builder.whitelist_path("--whitelist-path", path, pattern);
    }
    for spec in &args.blacklist_path {
        let (path, pattern) = split_path_spec(spec);
        builder.blacklist_path("--blacklist-path", path, pattern);
    }
    for (name, value) in &args.setting {
        builder.setting("--setting", name, value);
    }
    builder.build()
}

fn write_report(report: &RunReport, out: &mut impl Write) -> io::Result<()> {
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(_) => writeln!(out, "ok      {}", outcome.action)?,
            Err(e) => writeln!(out, "failed  {}: {e}", outcome.action)?,
        }
    }
    if report.lost > 0 {
        writeln!(out, "lost    {} request(s) did not complete", report.lost)?;
    }
    writeln!(
        out,
        "{} succeeded, {} failed",
        report.succeeded(),
        report.failed()
    )
}

/// Print the plan on a dry run, otherwise connect and send it.
///
/// `connect` is only called when requests are actually sent, so a dry run needs neither
/// the site config nor credentials.
async fn deliver<F>(
    plan: &Plan,
    dry_run: bool,
    concurrency: usize,
    connect: F,
    out: &mut impl Write,
) -> Result<Option<RunReport>>
where
    F: FnOnce() -> Result<Arc<dyn WafApi>>,
{
    if dry_run {
        for action in plan.actions() {
            writeln!(out, "{action}")?;
        }
        writeln!(out, "{} request(s) would be sent", plan.len())?;
        return Ok(None);
    }

    let api = connect()?;
    let report = Executor::new(api, concurrency).execute(plan).await;
    write_report(&report, out)?;
    Ok(Some(report))
}

async fn apply_command(args: ApplyArgs) -> Result<()> {
    let template: Option<Template> = args
        .template
        .as_deref()
        .map(config::load_template)
        .transpose()?;
    if template.as_ref().is_some_and(Template::is_empty) {
        tracing::warn!("The template lists no IPs, subnets, paths or settings");
    }
    let template_changes = template
        .as_ref()
        .map(TemplateValidator::validate)
        .transpose()
        .wrap_err("Template is invalid")?;
    let changes = flag_changes(&args).wrap_err("Invalid command-line arguments")?;

    if args.delete && template.is_some() {
        tracing::info!("--delete only applies to entries given on the command line");
    }

    let plan = Plan::build(
        &changes,
        template_changes.as_ref(),
        args.delete,
        args.max_subnet_hosts,
    )?;

    if plan.is_empty() {
        tracing::warn!("Nothing to do: no IPs, subnets, paths or settings were given");
        return Ok(());
    }

    let connect = || -> Result<Arc<dyn WafApi>> {
        let site_config = load_site_config(&args.credentials)?;
        let credentials = resolve_credentials(
            &flag_layer(&args.credentials),
            template.as_ref().map(CredentialLayer::from_template).as_ref(),
            &site_config,
        )?;
        let client = SucuriClient::new(&args.api.api_url, credentials, args.api.timeout.into())
            .wrap_err("Failed to create WAF API client")?;
        let api: Arc<dyn WafApi> = Arc::new(client);
        Ok(api)
    };

    let report = deliver(
        &plan,
        args.dry_run,
        args.concurrency,
        connect,
        &mut io::stdout(),
    )
    .await?;

    match report {
        Some(report) if !report.is_success() => Err(eyre!(
            "{} of {} request(s) failed",
            report.failed(),
            plan.len()
        )),
        _ => Ok(()),
    }
}

async fn show_settings_command(credentials: CredentialArgs, api: ApiArgs) -> Result<()> {
    let site_config = load_site_config(&credentials)?;
    let resolved = resolve_credentials(&flag_layer(&credentials), None, &site_config)?;

    let client = SucuriClient::new(&api.api_url, resolved, api.timeout.into())
        .wrap_err("Failed to create WAF API client")?;
    let response = client
        .submit(&WafAction::ShowSettings)
        .await
        .wrap_err("Failed to fetch settings")?;

    let output = response.output.unwrap_or_default();
    println!(
        "{}",
        serde_json::to_string_pretty(&output).wrap_err("Failed to format settings")?
    );
    Ok(())
}

fn expand_command(subnets: &[String], max_subnet_hosts: u64) -> Result<()> {
    let networks = subnets
        .iter()
        .map(|s| s.parse::<Ipv4Network>())
        .collect::<Result<Vec<_>, _>>()?;

    // Check the total before printing anything.
    expand_subnets(&networks, max_subnet_hosts)?;

    for network in &networks {
        println!("# {network} ({} usable hosts)", network.host_count());
        for host in network.hosts() {
            println!("{host}");
        }
    }
    Ok(())
}

fn validate_command(template_path: &Path) -> Result<()> {
    let template = config::load_template(template_path)?;
    if template.is_empty() {
        tracing::warn!("Template {} lists no changes", template_path.display());
    }
    let changes = TemplateValidator::validate(&template)
        .wrap_err_with(|| format!("Template {} is invalid", template_path.display()))?;
    let plan = Plan::build(&changes, None, false, DEFAULT_MAX_SUBNET_HOSTS)?;

    println!(
        "Template {} is valid: {} request(s)",
        template_path.display(),
        plan.len()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    tracing_setup::init_tracing(&args.log_level, args.log_format)
        .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

    match args.command {
        Some(Commands::SettingsHelp) => {
            print!("{}", settings::help_text());
            Ok(())
        }
        Some(Commands::ShowSettings { credentials, api }) => {
            let span = tracing_setup::create_run_span("show-settings", credentials.site.as_deref());
            show_settings_command(credentials, api)
                .instrument(span)
                .await
        }
        Some(Commands::Expand {
            subnets,
            max_subnet_hosts,
        }) => expand_command(&subnets, max_subnet_hosts),
        Some(Commands::Validate { template }) => validate_command(&template),
        None => {
            let span =
                tracing_setup::create_run_span("apply", args.apply.credentials.site.as_deref());
            apply_command(args.apply).instrument(span).await
        }
    }
}

mod cli;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use cli::{Cli, Commands, Credentials, RenderArgs, RunArgs};
use dripfeed_core::{
    read_config_file, Candidate, ConfigError, CoreError, ErrorReporter, LifecycleState, RuleSet,
    RunConfig, TemplatePools,
};
use dripfeed_engine::{
    CsvAuditSink, JsonLinesAuditSink, NoopPoster, Poster, RunController, RunReport,
    StaticRuleOracle, VariationEngine, VariationMemory,
};
use reddit_client::{prefetch_rules, DiscoveryConfig, RedditApiClient, ThreadDiscovery};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("dripfeed=info,dripfeed_engine=info,reddit_client=info")
        }))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Render(args) => render(args),
    }
}

struct LoadedRun {
    source: String,
    config: RunConfig,
    pools: TemplatePools,
    rules: Option<RuleSet>,
}

fn load(
    config: &Path,
    pools: Option<&Path>,
    rules: Option<&Path>,
) -> Result<LoadedRun, CoreError> {
    let source = read_config_file(config)?;
    let config = RunConfig::from_toml_str(&source)?;
    let pools = match pools {
        Some(path) => TemplatePools::from_file(path)?,
        None => TemplatePools::default(),
    };
    let rules = rules.map(|path| RuleSet::from_file(path)).transpose()?;

    Ok(LoadedRun {
        source,
        config,
        pools,
        rules,
    })
}

fn load_reported(
    config: &Path,
    pools: Option<&Path>,
    rules: Option<&Path>,
) -> Result<LoadedRun> {
    load(config, pools, rules).map_err(|e| {
        ErrorReporter::new().report_error(&e);
        anyhow!(e).context(format!("Failed to load {}", config.display()))
    })
}

fn api_client(credentials: &Credentials) -> Result<Option<RedditApiClient>> {
    credentials
        .access_token
        .as_deref()
        .filter(|token| !token.trim().is_empty())
        .map(|token| RedditApiClient::new(credentials.user_agent.as_str(), token))
        .transpose()
        .context("Failed to create Reddit client")
}

fn missing_token() -> anyhow::Error {
    let error = CoreError::from(ConfigError::MissingEnvironmentVariable {
        var_name: "REDDIT_ACCESS_TOKEN".to_string(),
    });
    ErrorReporter::new().report_error(&error);
    anyhow!(error)
}

async fn run(args: RunArgs) -> Result<()> {
    let LoadedRun {
        source,
        mut config,
        pools,
        rules,
    } = load_reported(&args.config, args.pools.as_deref(), args.rules.as_deref())?;
    if args.dry_run {
        config.dry_run = true;
    }

    let client = api_client(&args.credentials)?;
    if client.is_none() && !config.dry_run {
        return Err(missing_token()
            .context("Live posting needs an access token; pass --dry-run to preview the run"));
    }

    let candidates = if args.search {
        let client = client
            .as_ref()
            .ok_or_else(|| missing_token().context("--search needs an access token"))?;
        let discovery = DiscoveryConfig::from_run_toml(&source)?;
        ThreadDiscovery::new(client, discovery)
            .discover(&config.brand)
            .await
    } else {
        let path = args
            .candidates
            .as_deref()
            .ok_or_else(|| anyhow!("Either --candidates or --search is required"))?;
        read_candidates(path)?
    };
    info!(count = candidates.len(), "Candidates loaded");

    let oracle = match (rules, client.as_ref()) {
        (Some(rules), _) => StaticRuleOracle::from(rules),
        (None, Some(client)) => prefetch_rules(client, &candidates).await,
        (None, None) => {
            warn!("No rules file and no API access; every subreddit is treated as unrestricted");
            StaticRuleOracle::new()
        }
    };

    let poster: Arc<dyn Poster> = match client {
        Some(client) if !config.dry_run => Arc::new(client),
        _ => Arc::new(NoopPoster),
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current step");
            on_signal.cancel();
        }
    });

    let mut controller =
        RunController::new(config, pools, poster, oracle).with_cancellation(cancel);
    if let Some(path) = &args.csv {
        controller = controller.with_sink(CsvAuditSink::new(create(path)?));
    }
    if let Some(path) = &args.jsonl {
        controller = controller.with_sink(JsonLinesAuditSink::new(create(path)?));
    }

    let report = controller.run(candidates).await?;
    print_summary(&report);

    match report.state {
        LifecycleState::Failed { reason } => Err(anyhow!("Run failed: {}", reason)),
        _ => Ok(()),
    }
}

fn render(args: RenderArgs) -> Result<()> {
    let LoadedRun { config, pools, .. } =
        load_reported(&args.config, args.pools.as_deref(), None)?;
    config.validate().map_err(|e| {
        let error = CoreError::from(e);
        ErrorReporter::new().report_error(&error);
        anyhow!(error).context(format!("Invalid run configuration in {}", args.config.display()))
    })?;
    let engine = VariationEngine::new(pools);
    let mut memory = VariationMemory::new();

    for index in 0..args.count {
        let previous = args
            .subreddit
            .as_deref()
            .and_then(|subreddit| memory.previous(subreddit));
        let rendering = engine.render(&config, index, previous)?;
        if let Some(subreddit) = args.subreddit.as_deref() {
            memory.remember(subreddit, rendering.selection);
        }

        println!("--- variation {} ---", index + 1);
        println!("{}\n", rendering.text);
    }

    Ok(())
}

fn read_candidates(path: &Path) -> Result<Vec<Candidate>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read candidates from {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid candidate list in {}", path.display()))
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn print_summary(report: &RunReport) {
    info!(
        run_id = %report.run_id,
        state = %report.state,
        total_posted = report.total_posted,
        "Run summary"
    );

    println!("Run {} finished: {}", report.run_id, report.state);
    for label in ["posted", "queued", "skipped", "failed"] {
        let count = report.count(label);
        if count > 0 {
            println!("  {:<8} {}", label, count);
        }
    }
    for (subreddit, count) in &report.per_subreddit {
        println!("  r/{:<20} {}", subreddit, count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_temp(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("dripfeed-{}-{}", std::process::id(), name));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_missing_run_file_is_a_config_error() {
        let result = load(Path::new("/definitely/not/here.toml"), None, None);
        assert!(matches!(
            result,
            Err(CoreError::Config(ConfigError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn test_render_rejects_invalid_config() {
        let config = write_temp(
            "zero-rate.toml",
            "base_message = \"hello\"\nposts_per_hour = 0.0\n",
        );
        let result = render(RenderArgs {
            config: config.clone(),
            pools: None,
            count: 1,
            subreddit: None,
        });
        std::fs::remove_file(&config).unwrap();

        let error = result.unwrap_err();
        assert!(matches!(
            error.downcast_ref::<CoreError>(),
            Some(CoreError::Config(ConfigError::InvalidValue { field, .. })) if field == "posts_per_hour"
        ));
    }

    #[test]
    fn test_render_previews_valid_config() {
        let config = write_temp("valid.toml", include_str!("../demos/run.toml"));
        let result = render(RenderArgs {
            config: config.clone(),
            pools: None,
            count: 2,
            subreddit: Some("ReferralCodes".to_string()),
        });
        std::fs::remove_file(&config).unwrap();

        assert!(result.is_ok());
    }
}

use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::WrapErr as _;
use itemgate::{
    jwks::SigningKeySet, Authorizer, AuthorizerConfig, AuthorizerEvent, KeyDirectory,
    StaticKeyDirectory,
};
use tracing_subscriber::EnvFilter;

/// Checks bearer tokens against an identity provider's signing keys
#[derive(Debug, Parser)]
#[command(name = "itemgate", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Prints the authorization decision for a bearer token as JSON
    Authorize(AuthorizeOpts),

    /// Prints the identifier of each signing key served by the directory
    FetchKeys(SourceOpts),
}

#[derive(Debug, Args)]
struct AuthorizeOpts {
    /// The `Authorization` header value, including the `Bearer` scheme
    #[arg(short, long, env = "ITEMGATE_AUTHORIZATION", hide_env_values = true)]
    token: Option<String>,

    #[command(flatten)]
    source: SourceOpts,

    /// Requires tokens to carry this `iss` claim
    #[arg(long, env = "ITEMGATE_ISSUER")]
    issuer: Option<String>,

    /// Accepts tokens issued for this audience; may be repeated
    #[arg(long = "audience", env = "ITEMGATE_AUDIENCES", value_delimiter = ',')]
    audiences: Vec<String>,

    /// Requires the `sub` claim to match this regular expression
    #[arg(long, env = "ITEMGATE_SUBJECT_PATTERN")]
    subject_pattern: Option<String>,

    /// Rejects tokens that carry no `exp` claim
    #[arg(long, env = "ITEMGATE_REQUIRE_EXPIRATION")]
    require_expiration: bool,

    /// Grace period applied to the `nbf` and `exp` claims
    #[arg(long, env = "ITEMGATE_LEEWAY_SECS", default_value_t = 0)]
    leeway_secs: u64,
}

#[derive(Debug, Args)]
struct SourceOpts {
    /// The identity provider's published key set
    #[arg(
        short = 'u',
        long,
        env = "ITEMGATE_JWKS_URL",
        required_unless_present = "jwks_file",
        conflicts_with = "jwks_file"
    )]
    jwks_url: Option<String>,

    /// A local copy of the key set, used instead of fetching one
    #[arg(short = 'f', long)]
    jwks_file: Option<PathBuf>,

    /// Bounds the key set request
    #[arg(long, env = "ITEMGATE_TIMEOUT_SECS", default_value_t = 5)]
    timeout_secs: u64,

    /// Reuses a fetched key set for this long; zero disables caching
    #[arg(long, env = "ITEMGATE_CACHE_TTL_SECS", default_value_t = 0)]
    cache_ttl_secs: u64,

    /// Permits a plain `http` key set URL
    #[arg(long, env = "ITEMGATE_ALLOW_INSECURE_HTTP")]
    allow_insecure_http: bool,
}

impl SourceOpts {
    fn config(&self) -> AuthorizerConfig {
        let location = match (&self.jwks_url, &self.jwks_file) {
            (Some(url), _) => url.clone(),
            (None, Some(path)) => path.display().to_string(),
            (None, None) => String::new(),
        };

        let config = AuthorizerConfig::new(location)
            .with_fetch_timeout(Duration::from_secs(self.timeout_secs))
            .with_cache_ttl(Duration::from_secs(self.cache_ttl_secs));

        if self.allow_insecure_http {
            config.allow_insecure_http()
        } else {
            config
        }
    }

    fn key_directory(&self, config: &AuthorizerConfig) -> color_eyre::Result<Arc<dyn KeyDirectory>> {
        if let Some(path) = &self.jwks_file {
            let raw = std::fs::read(path)
                .wrap_err_with(|| format!("unable to read key set from {}", path.display()))?;
            let keys: SigningKeySet =
                serde_json::from_slice(&raw).wrap_err("unable to parse key set")?;
            tracing::debug!(keys = keys.len(), path = %path.display(), "loaded key set from file");
            return Ok(Arc::new(StaticKeyDirectory::new(keys)));
        }

        Ok(config.key_directory()?)
    }
}

impl AuthorizeOpts {
    fn config(&self) -> AuthorizerConfig {
        let mut config = self
            .source
            .config()
            .with_leeway(Duration::from_secs(self.leeway_secs));

        if let Some(issuer) = &self.issuer {
            config = config.with_issuer(issuer.as_str());
        }

        if self.require_expiration {
            config = config.require_expiration();
        }

        if let Some(pattern) = &self.subject_pattern {
            config = config.with_subject_pattern(pattern.as_str());
        }

        self.audiences
            .iter()
            .fold(config, |config, audience| config.with_audience(audience.as_str()))
    }
}

async fn authorize(opts: AuthorizeOpts) -> color_eyre::Result<()> {
    let config = opts.config();
    let directory = opts.source.key_directory(&config)?;
    let authorizer = Authorizer::new(directory).with_validator(config.validator()?);

    let event = opts.token.map(AuthorizerEvent::new).unwrap_or_default();
    let decision = authorizer.authorize(&event).await;

    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

async fn fetch_keys(opts: SourceOpts) -> color_eyre::Result<()> {
    let config = opts.config();
    let directory = opts.key_directory(&config)?;
    let keys = directory.fetch_keys().await?;

    for key in keys.keys() {
        println!("{}", key.key_id());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    match Cli::parse().command {
        Command::Authorize(opts) => authorize(opts).await,
        Command::FetchKeys(opts) => fetch_keys(opts).await,
    }
}

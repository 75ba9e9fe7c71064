//! mailbridge - Run one mailbox request
//!
//! Usage: `mailbridge [--pool-config FILE] [REQUEST_FILE]`
//!
//! The request is read from REQUEST_FILE, or stdin if omitted. The JSON result
//! goes to stdout; logs go to stderr.

use anyhow::{bail, Context};
use mailbridge_auth::{CredentialResolver, OAuth2Refresher};
use mailbridge_core::{dispatch, CoreError, Mailbox, PoolConfig, Request};
use mailbridge_imap::ImapConnector;
use serde_json::json;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Default, PartialEq)]
struct Args {
    pool_config: Option<PathBuf>,
    request: Option<PathBuf>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Args> {
    let mut parsed = Args::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--pool-config" => {
                let path = args.next().context("--pool-config needs a file")?;
                parsed.pool_config = Some(PathBuf::from(path));
            }
            flag if flag.starts_with("--") => bail!("Unknown option {}", flag),
            path if parsed.request.is_none() => parsed.request = Some(PathBuf::from(path)),
            extra => bail!("Unexpected argument {}", extra),
        }
    }
    Ok(parsed)
}

fn load_pool_config(path: Option<&PathBuf>) -> anyhow::Result<PoolConfig> {
    let Some(path) = path else {
        return Ok(PoolConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pool config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid pool config {}", path.display()))
}

fn read_request(path: Option<&PathBuf>) -> anyhow::Result<Request> {
    let text = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request {}", path.display()))?,
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read request from stdin")?;
            text
        }
    };
    serde_json::from_str(&text).context("Invalid request")
}

async fn run() -> anyhow::Result<serde_json::Value> {
    let args = parse_args(std::env::args().skip(1))?;
    let config = load_pool_config(args.pool_config.as_ref())?;
    let request = read_request(args.request.as_ref())?;

    let mailbox = Mailbox::new(
        ImapConnector::new(),
        CredentialResolver::new(Arc::new(OAuth2Refresher::default())),
        config,
    );
    let result = dispatch(&mailbox, request).await;
    mailbox.shutdown();

    Ok(serde_json::to_value(result?)?)
}

/// Taxonomy tag for an error reaching the edge
fn error_kind(error: &anyhow::Error) -> &'static str {
    error
        .downcast_ref::<CoreError>()
        .map(CoreError::kind)
        .unwrap_or("request")
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mailbridge=info")))
        .init();

    match run().await {
        Ok(output) => println!("{}", output),
        Err(e) => {
            tracing::error!("Request failed: {:#}", e);
            println!("{}", json!({ "error": format!("{:#}", e), "kind": error_kind(&e) }));
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> anyhow::Result<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_args() {
        assert_eq!(args(&[]).unwrap(), Args::default());

        let parsed = args(&["--pool-config", "pool.json", "req.json"]).unwrap();
        assert_eq!(parsed.pool_config, Some(PathBuf::from("pool.json")));
        assert_eq!(parsed.request, Some(PathBuf::from("req.json")));
    }

    #[test]
    fn test_parse_args_rejects_bad_input() {
        assert!(args(&["--pool-config"]).is_err());
        assert!(args(&["--verbose"]).is_err());
        assert!(args(&["a.json", "b.json"]).is_err());
    }

    #[test]
    fn test_error_kind() {
        let core = anyhow::Error::new(CoreError::AcquireTimeout);
        assert_eq!(error_kind(&core), "acquire_timeout");
        assert_eq!(error_kind(&anyhow::anyhow!("bad json")), "request");
    }
}

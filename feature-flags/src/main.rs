use std::sync::Arc;

use anyhow::{bail, Context, Result};
use envconfig::Envconfig;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use feature_flag_overrides::cache;
use feature_flag_overrides::config::Config;
use feature_flag_overrides::flags::flag_resolver::FlagResolver;
use feature_flag_overrides::flags::flag_source::FileFlagSource;
use feature_flag_overrides::ui::overrides_panel::OverridesPanel;

enum Action {
    Enable(String),
    Disable(String),
    Reset(String),
    ResetAll,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<(String, Vec<Action>)> {
    let path = args
        .next()
        .context("usage: feature-flag-overrides <flags.json> [--enable KEY] [--disable KEY] [--reset KEY] [--reset-all]")?;

    let mut actions = Vec::new();
    while let Some(arg) = args.next() {
        let action = match arg.as_str() {
            "--reset-all" => Action::ResetAll,
            "--enable" | "--disable" | "--reset" => {
                let key = args.next().with_context(|| format!("{arg} needs a flag key"))?;
                match arg.as_str() {
                    "--enable" => Action::Enable(key),
                    "--disable" => Action::Disable(key),
                    _ => Action::Reset(key),
                }
            }
            other => bail!("unknown argument: {other}"),
        };
        actions.push(action);
    }
    Ok((path, actions))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::init_from_env().context("Invalid configuration")?;

    let log_layer = {
        let base_layer = fmt::layer().with_target(true).with_level(true);
        if *config.debug {
            base_layer
                .with_ansi(true)
                .with_filter(EnvFilter::from_default_env())
                .boxed()
        } else {
            base_layer
                .json()
                .with_filter(EnvFilter::from_default_env())
                .boxed()
        }
    };
    tracing_subscriber::registry().with(log_layer).init();

    let (path, actions) = parse_args(std::env::args().skip(1))?;

    let backing = cache::from_config(&config).context("failed to set up override cache")?;
    let resolver = Arc::new(FlagResolver::from_config(&config, backing));

    let outcome = resolver
        .refresh_from(&FileFlagSource::new(path))
        .await
        .context("failed to load flags")?;
    for skipped in &outcome.skipped {
        tracing::warn!(code = skipped.error_code(), "{}", skipped);
    }

    let panel = OverridesPanel::new(resolver);
    for action in actions {
        match action {
            Action::Enable(key) => panel.enable(&key),
            Action::Disable(key) => panel.disable(&key),
            Action::Reset(key) => panel.reset(&key),
            Action::ResetAll => panel.reset_all(),
        }
    }

    println!("{}", serde_json::to_string_pretty(&panel.rows())?);
    Ok(())
}

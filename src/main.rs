//! Prerender CLI entry point.
//!
//! Renders components described by a TOML configuration file, or checks that
//! every registered component loads.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use prerender_common::ConfigFile;
use prerender_core::{Props, Renderer, RendererSetup};
use prerender_host::BoaFactory;

#[derive(Debug, Parser)]
#[command(name = "prerender", version, about = "Server-side prerendering of script components")]
struct Cli {
    /// Configuration file.
    #[arg(short, long, env = "PRERENDER_CONFIG", default_value = "prerender.toml")]
    config: PathBuf,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Render a component and print its markup.
    Render {
        /// Component name.
        component: String,

        /// Request path passed to the component.
        #[arg(long, default_value = "/")]
        url: String,

        /// Props as JSON.
        #[arg(long, default_value = "{}")]
        props: String,

        /// Render this many times concurrently (markup is printed once).
        #[arg(long, default_value_t = 1)]
        concurrency: usize,
    },

    /// Load every registered component and report failures.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = ConfigFile::from_file(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    let wrapper = config.wrapper.load().context("Failed to load wrapper template")?;

    info!(
        config = %cli.config.display(),
        components = config.components.len(),
        "Configuration loaded"
    );

    let config = Arc::new(config);
    let registry = {
        let config = Arc::clone(&config);
        move || read_sources(&config)
    };

    let setup = RendererSetup::new(BoaFactory::new(), registry, wrapper)
        .with_config(config.renderer.clone());
    let renderer = Arc::new(Renderer::new(&setup)?);

    let result = match cli.command {
        Command::Render {
            component,
            url,
            props,
            concurrency,
        } => render(&renderer, component, url, &props, concurrency).await,
        Command::Check => check(&renderer),
    };

    renderer.shutdown();
    result
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,prerender=debug,prerender_core=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Read every source file listed in the configuration.
///
/// Called on every bundle rebuild, so edits on disk are picked up. Files that
/// cannot be read are logged and left out.
fn read_sources(config: &ConfigFile) -> HashMap<String, String> {
    let mut sources = HashMap::with_capacity(config.components.len() + 1);

    if let Some(core) = &config.core {
        match core.load() {
            Ok(source) => {
                sources.insert(prerender_core::CORE_COMPONENT.to_string(), source);
            }
            Err(e) => warn!(error = %e, "Skipping core library"),
        }
    }

    for entry in &config.components {
        match entry.load() {
            Ok(source) => {
                sources.insert(entry.name.clone(), source);
            }
            Err(e) => warn!(component = %entry.name, error = %e, "Skipping component"),
        }
    }

    sources
}

async fn render(
    renderer: &Arc<Renderer>,
    component: String,
    url: String,
    props: &str,
    concurrency: usize,
) -> anyhow::Result<()> {
    let props: serde_json::Value =
        serde_json::from_str(props).context("--props must be valid JSON")?;
    let start = Instant::now();

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..concurrency.max(1) {
        tasks.spawn(Arc::clone(renderer).render_async(
            component.clone(),
            url.clone(),
            Props::from(props.clone()),
        ));
    }

    let mut markup = None;
    let mut failures = 0usize;
    while let Some(joined) = tasks.join_next().await {
        match joined.context("Render task panicked")? {
            Ok(html) => {
                markup.get_or_insert(html);
            }
            Err(e) => {
                error!(error = %e, retryable = e.is_retryable(), "Render failed");
                failures += 1;
            }
        }
    }

    let status = renderer.pool_status();
    info!(
        renders = concurrency.max(1),
        failures,
        duration_ms = start.elapsed().as_millis(),
        contexts = status.created,
        "Renders finished"
    );

    match markup {
        Some(html) if failures == 0 => {
            println!("{html}");
            Ok(())
        }
        Some(html) => {
            println!("{html}");
            bail!("{failures} render(s) failed")
        }
        None => bail!("every render of {component} failed"),
    }
}

fn check(renderer: &Renderer) -> anyhow::Result<()> {
    let components = renderer.components();
    let mut failed = Vec::new();

    for component in &components {
        match renderer.load(component) {
            Ok(_) => info!(component = %component, "Component loads"),
            Err(e) => {
                error!(component = %component, error = %e, "Component failed to load");
                failed.push(component.as_str());
            }
        }
    }

    if failed.is_empty() {
        println!("{} component(s) OK", components.len());
        Ok(())
    } else {
        bail!("{} of {} component(s) failed: {}", failed.len(), components.len(), failed.join(", "))
    }
}

//! Pipeline runner binary.
//!
//! Loads the built-in capabilities, runs a YAML pipeline against them and
//! prints every outcome as JSON.
//!
//! # Environment Variables
//!
//! - `DISPATCH_*`: overrides for the dispatch config (see `DispatchConfig`)
//! - `RUST_LOG`: log filter (default: "info")
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin dispatch -- pipeline.yaml [config.yaml]
//! ```

use std::sync::Arc;

use anyhow::{bail, Context};

use capability_dispatch::context::share;
use capability_dispatch::executor::PipelineDefinition;
use capability_dispatch::{
    builtin_catalog, CapabilityRegistry, ContextBuilder, DispatchConfig, Executor,
};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let Some(pipeline_path) = args.next() else {
        bail!("usage: dispatch <pipeline.yaml> [config.yaml]");
    };

    let mut config = match args.next() {
        Some(path) => DispatchConfig::from_yaml_file(&path)
            .with_context(|| format!("loading config from {}", path))?,
        None => DispatchConfig::default(),
    };
    config.apply_env().context("applying DISPATCH_* overrides")?;

    let definition = PipelineDefinition::from_yaml_file(&pipeline_path)
        .with_context(|| format!("loading pipeline from {}", pipeline_path))?;

    let registry = Arc::new(CapabilityRegistry::with_policy(config.confidence_policy));
    let discovered = registry.discover(&[&builtin_catalog()], true);
    log::info!(
        "Discovered {} capabilities: {}",
        discovered.len(),
        registry.list(None).join(", ")
    );

    let context = share(ContextBuilder::new().current_task(pipeline_path.clone()).build());
    let executor = Executor::new(registry)
        .with_config(config)
        .with_context(Arc::clone(&context));

    let outcomes = executor.run_pipeline(&definition);
    for outcome in &outcomes {
        println!("{}", serde_json::to_string_pretty(outcome)?);
    }

    let released = context.lock().release_all();
    log::info!(
        "Ran {} of {} step(s); released {} resource(s)",
        outcomes.len(),
        definition.steps.len(),
        released
    );

    if outcomes.iter().any(|o| !o.success) {
        std::process::exit(1);
    }
    Ok(())
}

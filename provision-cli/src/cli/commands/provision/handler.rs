//! Provision command handler

use anyhow::{Context, Result};
use dialoguer::{Input, Password};
use is_terminal::IsTerminal;
use log::{debug, info};
use std::sync::Arc;

use super::output;
use crate::catalog::EntityCatalog;
use crate::cli::Cli;
use crate::config::{API_KEY_ENV, PARENT_ID_ENV, ProvisionConfig};
use crate::provision::{FileManifestStore, ManifestStore, Provisioner, ProvisioningContext};

/// Run the command; returns whether provisioning succeeded
pub async fn handle_provision_command(cli: Cli) -> Result<bool> {
    if cli.no_color {
        colored::control::set_override(false);
    }

    let mut config = ProvisionConfig::load(cli.config.as_deref())?;
    if let Some(base_url) = &cli.base_url {
        config.api.base_url = base_url.clone();
    }
    if let Some(path) = &cli.manifest {
        config.manifest.path = Some(path.clone());
    }

    let store = Arc::new(FileManifestStore::new(config.manifest_path()));
    let provisioner = Provisioner::new(EntityCatalog::lifelog(), config.resilience(), store.clone())
        .context("Schema catalog is inconsistent")?;

    if cli.plan {
        print!(
            "{}",
            output::render_plan(provisioner.catalog(), provisioner.plan())
        );
        return Ok(true);
    }

    let api_key = resolve_value(cli.api_key, API_KEY_ENV, "Integration key", true)?;
    let parent_id = resolve_value(cli.parent_id, PARENT_ID_ENV, "Parent page id", false)?;
    let ctx = ProvisioningContext::notion(api_key, parent_id, &config.api)?;

    let report = match store.load()? {
        Some(manifest) => {
            manifest.check_parent(&ctx.parent_container_id).with_context(|| {
                format!(
                    "Refusing to resume {}; pass --manifest to start a separate run",
                    store.path().display()
                )
            })?;
            info!("Resuming from {}", store.path().display());
            provisioner.resume(&ctx, manifest).await?
        }
        None => provisioner.run(&ctx).await?,
    };

    if cli.report {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize run report")?
        );
    } else if report.success {
        let ids = report.flat_ids(provisioner.catalog());
        println!(
            "{}",
            serde_json::to_string_pretty(&ids).context("Failed to serialize manifest")?
        );
    }

    if report.success {
        if !report.manual_action_required.is_empty() {
            eprint!("{}", output::render_manual_actions(&report));
        }
    } else {
        eprint!(
            "{}",
            output::render_failure(provisioner.catalog(), &report, store.path())
        );
    }

    Ok(report.success)
}

/// Argument, then environment, then an interactive prompt
fn resolve_value(arg: Option<String>, env: &str, prompt: &str, secret: bool) -> Result<String> {
    if let Some(value) = non_empty(arg) {
        return Ok(value);
    }
    if let Some(value) = non_empty(std::env::var(env).ok()) {
        debug!("{} read from {}", prompt, env);
        return Ok(value);
    }

    if !std::io::stdin().is_terminal() {
        anyhow::bail!(
            "{} missing: pass it as an argument or set {}",
            prompt,
            env
        );
    }

    let value = if secret {
        Password::new()
            .with_prompt(prompt)
            .interact()
            .with_context(|| format!("Failed to read {}", prompt.to_lowercase()))?
    } else {
        Input::<String>::new()
            .with_prompt(prompt)
            .interact_text()
            .with_context(|| format!("Failed to read {}", prompt.to_lowercase()))?
    };

    non_empty(Some(value)).with_context(|| format!("{} cannot be empty", prompt))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

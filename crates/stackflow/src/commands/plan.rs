use crate::utils::{Clouds, PlanState, load_cluster};
use anyhow::Context;
use colored::Colorize;
use stackflow_config::OperatorConfig;
use std::path::Path;

/// Calls that only read state
fn is_read(operation: &str) -> bool {
    ["list_", "get_", "describe_"]
        .iter()
        .any(|prefix| operation.starts_with(prefix))
}

pub async fn handle(
    config: OperatorConfig,
    cluster: &Path,
    state: Option<&Path>,
    save: Option<&Path>,
) -> anyhow::Result<()> {
    let spec = load_cluster(cluster)?;
    let clouds = Clouds::new(&config, PlanState::load(state)?);
    let router = stackflow_aws::new_router(&clouds.chain_config(config))?;

    let report = router
        .reconcile(&spec)
        .await
        .with_context(|| format!("reconciliation of {} failed", spec.id))?;

    println!(
        "{} {} (version {})",
        "Plan for cluster".bold(),
        report.instance.cyan(),
        report.version
    );
    for resource in &report.resources {
        let summary = if resource.summary.has_changes() {
            resource.summary.to_string().yellow()
        } else {
            "no changes".green()
        };
        println!("  {:<16} {}", resource.name, summary);
    }
    println!("  {:<16} {}", "total".bold(), report.total());

    let mut calls = clouds.guest.calls().await;
    if let Some(host) = &clouds.host {
        calls.extend(host.calls().await);
    }
    let changes: Vec<_> = calls.iter().filter(|c| !is_read(c.operation)).collect();
    if !changes.is_empty() {
        println!();
        println!("{}", "Provider calls:".bold());
        for call in changes {
            println!("  {} {}", call.operation.blue(), call.target);
        }
    }

    if let Some(path) = save {
        let state = serde_json::to_string_pretty(&clouds.state().await)?;
        std::fs::write(path, state)
            .with_context(|| format!("failed to write state file {}", path.display()))?;
        println!();
        println!("State saved to {}", path.display().to_string().cyan());
    }

    Ok(())
}

use anyhow::Context;
use colored::Colorize;
use serde::Serialize;
use stackflow_aws::{AdapterContext, CloudConfigRenderer, StackTemplate, key};
use stackflow_config::OperatorConfig;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Rendered<'a> {
    stack_name: String,
    version: &'a str,
    parameters: BTreeMap<String, String>,
    template: StackTemplate,
}

pub fn handle(config: OperatorConfig, cluster: &Path) -> anyhow::Result<()> {
    let spec = crate::utils::load_cluster(cluster)?;
    let router = crate::utils::offline_router(config.clone())?;
    let version = router.select(&spec)?.version();

    let composer = stackflow_aws::versions::composer(version)
        .with_context(|| format!("version {version} has no stack composer"))?;
    let stack = composer.compose(&AdapterContext {
        spec: &spec,
        config: &config,
        bootstrap: &CloudConfigRenderer,
    })?;

    eprintln!(
        "{} {} ({} resources, version {})",
        "Rendered".green().bold(),
        key::stack_name(&spec).cyan(),
        stack.template.resources.len(),
        version
    );

    let rendered = Rendered {
        stack_name: key::stack_name(&spec),
        version,
        parameters: stack.parameters,
        template: stack.template,
    };
    println!("{}", serde_json::to_string_pretty(&rendered)?);
    Ok(())
}

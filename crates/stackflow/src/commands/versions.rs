use colored::Colorize;
use stackflow_config::OperatorConfig;

pub fn handle(config: OperatorConfig) -> anyhow::Result<()> {
    let router = crate::utils::offline_router(config)?;
    let oldest = router.oldest().version();
    let latest = router.latest().version();

    println!("{}", "Supported versions:".bold());
    for chain in router.chains() {
        let version = chain.version();
        let mut notes = Vec::new();
        if version == oldest {
            notes.push("unmarked clusters");
        }
        if version == latest {
            notes.push("latest");
        }
        let notes = if notes.is_empty() {
            String::new()
        } else {
            format!(" ({})", notes.join(", "))
        };

        println!(
            "  {}{}  {}",
            version.cyan(),
            notes.dimmed(),
            chain.resources().join(" → ")
        );
        if let Some(composer) = stackflow_aws::versions::composer(version) {
            println!("        stack adapters: {}", composer.adapters().join(", "));
        }
    }

    Ok(())
}

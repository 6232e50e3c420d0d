//! `layerforge stages` command - Show the stage plan of a Dockerfile.

use clap::Args;
use layerforge_core::config::ForgeConfig;
use layerforge_runtime::{BuildEngine, LayoutEngine, PreparedStage, StagePlan};

use super::SourceArgs;
use crate::output;

#[derive(Args)]
pub struct StagesArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Output the plan as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(
    args: StagesArgs,
    mut config: ForgeConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    args.source.apply(&mut config)?;

    let engine = LayoutEngine::new();
    let (stages, meta_args) = engine.parse_stages(&config).await?;
    let prepared = engine.prepare_stages(&config, &stages, &meta_args).await?;
    let resolved: Vec<_> = prepared.iter().map(PreparedStage::resolved_stage).collect();
    let plan = StagePlan::resolve(&resolved, config.target_name())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }


    let mut table = output::new_table(&["INDEX", "NAME", "BASE", "FROM STAGE", "RETAIN", ""]);
    for planned in &plan.stages {
        let index = planned.stage.index;
        let base = planned.stage.base_name.clone();
        let from_stage = planned
            .base_stage
            .map(|i| i.to_string())
            .unwrap_or_else(|| "-".to_string());
        let marker = if index == plan.target { "target" } else { "" };

        table.add_row([
            index.to_string(),
            output::or_dash(&planned.stage.name),
            base,
            from_stage,
            if planned.retain { "yes" } else { "no" }.to_string(),
            marker.to_string(),
        ]);
    }
    println!("{table}");

    let chain: Vec<String> = plan
        .dependency_chain(plan.target)
        .iter()
        .map(|i| i.to_string())
        .collect();
    println!("Build chain: {}", chain.join(" <- "));

    Ok(())
}

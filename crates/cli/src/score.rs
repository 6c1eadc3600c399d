use crate::{list_dirs, print_json, ScoreArgs};
use anyhow::{Context as AnyhowContext, Result};
use faultrank_eval::{evaluate_project, with_totals, write_report, ProjectSources};

pub(crate) fn run(args: ScoreArgs) -> Result<()> {
    let layout = args.data.layout();
    let output_root = layout.final_split_dir();

    let projects = if args.projects.is_empty() {
        list_dirs(&output_root)?
    } else {
        args.projects.clone()
    };

    let mut rows = Vec::new();
    for project in &projects {
        let techniques = if args.techniques.is_empty() {
            let dir = output_root.join(project);
            if dir.is_dir() {
                list_dirs(&dir)?
            } else {
                log::warn!("No outputs for project {project} under {}", dir.display());
                Vec::new()
            }
        } else {
            args.techniques.clone()
        };

        for technique in &techniques {
            let sources = ProjectSources::from_layout(&layout, project, technique);
            let score = evaluate_project(project, technique, &sources);
            log::info!(
                "Project: {project}, Technique: {technique}, Top-1: {}, Top-3: {}, Top-5: {}, Top-10: {}",
                score.top_k.top_1,
                score.top_k.top_3,
                score.top_k.top_5,
                score.top_k.top_10
            );
            log::debug!("{project}/{technique} missed Top-1: {:?}", score.top_k.missed.top_1);
            rows.push(score.row(&layout.split));
        }
    }

    let rows = with_totals(rows);
    let out_dir = args.out_dir.clone().unwrap_or_else(|| layout.results_dir());
    let files = write_report(&out_dir, &rows)
        .with_context(|| format!("Failed to write report to {}", out_dir.display()))?;
    log::info!("Report written to {}", files.markdown.display());

    if args.json {
        print_json(&rows)?;
    }
    Ok(())
}

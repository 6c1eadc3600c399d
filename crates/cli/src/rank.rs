use crate::{list_dirs, print_json, RankArgs};
use anyhow::{Context as AnyhowContext, Result};
use faultrank_ranker::{build_model, BugTarget, ErrorLog, OutputLayout, Ranker, RankerConfig};
use std::io::Write;
use std::sync::Arc;

pub(crate) async fn run(args: RankArgs, mut config: RankerConfig) -> Result<()> {
    if let Some(mode) = args.model_mode {
        config.mode = mode.into();
    }
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(base) = &args.api_base {
        config.api_base = base.clone();
    }
    if let Some(ceiling) = args.input_ceiling {
        config.input_ceiling = ceiling;
    }
    if let Some(encoding) = args.encoding {
        config.encoding = encoding.into();
    }
    if let Some(jobs) = args.jobs {
        config.jobs = jobs;
    }
    if args.echo {
        config.echo_stream = true;
    }
    if let Some(combined) = &args.combined {
        config.combined_artifact = Some(combined.clone());
    }
    config.validate().context("Invalid ranker configuration")?;

    let layout = args.data.layout();
    let bugs = if args.bugs.is_empty() {
        let root = layout.chunks_technique_dir(&args.project, &args.technique);
        list_dirs(&root)?
    } else {
        args.bugs.clone()
    };
    if bugs.is_empty() {
        anyhow::bail!(
            "No bugs to rank for {} / {}",
            args.project,
            args.technique
        );
    }

    let overrides = args.chunks_dir.is_some() || args.raw_dir.is_some() || args.final_dir.is_some();
    if overrides && bugs.len() != 1 {
        anyhow::bail!("--chunks-dir/--raw-dir/--final-dir require exactly one --bug");
    }

    let targets: Vec<BugTarget> = bugs
        .iter()
        .map(|bug| {
            let mut target = BugTarget::from_layout(&layout, &args.project, &args.technique, bug);
            if let Some(dir) = &args.chunks_dir {
                target.chunks_dir = dir.clone();
            }
            if args.raw_dir.is_some() || args.final_dir.is_some() {
                target.outputs = OutputLayout::new(
                    args.raw_dir.clone().unwrap_or(target.outputs.raw_dir),
                    args.final_dir.clone().unwrap_or(target.outputs.final_dir),
                );
            }
            target
        })
        .collect();

    let model = build_model(&config).context("Failed to initialise model")?;
    log::info!(
        "Ranking {} bug(s) of {} / {} with {} ({})",
        targets.len(),
        args.project,
        args.technique,
        model.name(),
        config.mode.as_str()
    );

    let error_log = ErrorLog::new(
        args.error_log
            .clone()
            .unwrap_or_else(|| layout.error_log_path()),
    );
    let mut ranker = Ranker::new(model, &config, error_log);
    if config.echo_stream {
        ranker = ranker.with_observer(Arc::new(|fragment: &str| {
            let mut stderr = std::io::stderr().lock();
            let _ = stderr.write_all(fragment.as_bytes());
            let _ = stderr.flush();
        }));
    }

    let stats = ranker.rank_bugs(targets, config.jobs).await;
    if args.json {
        print_json(&stats)?;
    } else {
        log::info!(
            "Done: {} test(s) completed, {} aborted, {} turn(s), {} record(s), {} rejected block(s) in {} ms",
            stats.tests_completed,
            stats.tests_aborted,
            stats.chunks_processed,
            stats.records_extracted,
            stats.blocks_rejected,
            stats.time_ms
        );
    }
    Ok(())
}

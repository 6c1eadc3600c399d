use crate::{print_json, SplitArgs};
use anyhow::{Context as AnyhowContext, Result};
use faultrank_chunker::{
    parse_chunk_file_name, test_id_from_path, ChunkSplitter, SplitterConfig,
};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// `test_<id>.json`, but not an already split `test_<id>_<chunk>.json`.
fn is_coverage_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    name.ends_with(".json")
        && parse_chunk_file_name(name).is_none()
        && test_id_from_path(path).is_some()
}

pub(crate) fn run(args: SplitArgs) -> Result<()> {
    let splitter = ChunkSplitter::new(SplitterConfig {
        max_chunk_tokens: args.max_chunk_tokens,
        encoding: args.encoding.into(),
    })?;

    // Directory inputs keep their relative layout under the output directory.
    let inputs: Vec<(PathBuf, PathBuf)> = if args.input.is_dir() {
        WalkDir::new(&args.input)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(|path| is_coverage_file(path))
            .map(|path| {
                let relative_parent = path
                    .parent()
                    .and_then(|parent| parent.strip_prefix(&args.input).ok())
                    .map(PathBuf::from)
                    .unwrap_or_default();
                let out = args.out_dir.join(relative_parent);
                (path, out)
            })
            .collect()
    } else {
        vec![(args.input.clone(), args.out_dir.clone())]
    };

    let mut written = Vec::new();
    for (input, out_dir) in &inputs {
        let paths = splitter
            .split_file(input, out_dir)
            .with_context(|| format!("Failed to split {}", input.display()))?;
        written.extend(paths);
    }
    log::info!(
        "Split {} coverage file(s) into {} chunk(s)",
        inputs.len(),
        written.len()
    );

    if args.json {
        print_json(&written)?;
    }
    Ok(())
}

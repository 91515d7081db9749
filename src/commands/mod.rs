// src/commands/mod.rs

//! Binary-side command implementations.
//!
//! The CLI has no image registry collaborator wired in, so image
//! references fail with a reference error; directory and database
//! references work out of the box. Output goes to stdout, logs to stderr.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::warn;

use opcat::declcfg::convert::convert_from_model;
use opcat::declcfg::diff::{convert_to_diff_config, diff_index};
use opcat::declcfg::prune::prune_index;
use opcat::declcfg::write::{write_json, write_yaml};
use opcat::{
    CancelToken, DiffConfig, DiffOptions, PackageIndex, PruneConfig, PruneOptions, Render,
};

/// One deadline covers a whole render/diff/prune invocation.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

pub fn cmd_render(refs: &[String], output: &str) -> Result<()> {
    let cancel = CancelToken::with_timeout(COMMAND_TIMEOUT);
    let cfg = Render::new(refs.to_vec()).with_cancel(cancel).run()?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match output {
        "json" => write_json(&cfg, &mut out)?,
        _ => write_yaml(&cfg, &mut out)?,
    }
    out.flush()?;
    Ok(())
}

pub struct DiffArgs {
    pub old: Vec<String>,
    pub new: Vec<String>,
    pub fill: bool,
    pub heads: bool,
    pub deps: bool,
    pub permissive: bool,
    pub ca_file: Option<String>,
    pub skip_tls: bool,
}

pub fn cmd_diff(args: DiffArgs) -> Result<()> {
    if args.old.is_empty() {
        bail!("no old refs to diff");
    }
    if args.new.is_empty() {
        bail!("no new refs to diff");
    }
    if args.ca_file.is_some() || args.skip_tls {
        warn!("TLS flags only take effect with an image registry collaborator configured");
    }
    let cancel = CancelToken::with_timeout(COMMAND_TIMEOUT);

    let mut idx = PackageIndex::new();
    Render::new(args.new.clone())
        .with_cancel(cancel.clone())
        .index_into(&mut idx)
        .context("render new refs")?;

    // Old refs are either serialized diff configs or catalogs to render
    // and describe.
    let mut diff_cfg = DiffConfig::default();
    let mut render_refs: Vec<String> = Vec::new();
    for reference in &args.old {
        if let Some(cfg) = read_diff_config(reference) {
            diff_cfg.merge(cfg);
        } else {
            render_refs.push(reference.clone());
        }
    }
    if !render_refs.is_empty() {
        let old_cfg = Render::new(render_refs)
            .with_cancel(cancel.clone())
            .run()
            .context("render old refs")?;
        diff_cfg.merge(convert_to_diff_config(&old_cfg)?);
    }

    let opts = DiffOptions {
        permissive: args.permissive,
        heads: args.heads,
        deps: args.deps,
        fill: args.fill,
    };
    let result = diff_index(&idx, &diff_cfg, opts, &cancel);
    if let Err(e) = idx.cleanup() {
        warn!(error = %e, "failed to clean up diff index");
    }
    let cfg = convert_from_model(&result?);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    write_yaml(&cfg, &mut out)?;
    out.flush()?;
    Ok(())
}

/// A regular file that strictly parses as a non-empty diff config is one;
/// anything else is treated as a catalog reference.
fn read_diff_config(reference: &str) -> Option<DiffConfig> {
    let path = Path::new(reference);
    if !path.is_file() {
        return None;
    }
    let text = std::fs::read_to_string(path).ok()?;
    let cfg: DiffConfig = serde_yaml::from_str(&text).ok()?;
    if cfg.is_empty() {
        return None;
    }
    Some(cfg)
}

pub fn cmd_prune(
    from_index: &str,
    prune_config: &str,
    keep: bool,
    keep_heads: bool,
    permissive: bool,
) -> Result<()> {
    let text = std::fs::read_to_string(prune_config)
        .with_context(|| format!("read prune config {prune_config:?}"))?;
    let cfg: PruneConfig = serde_yaml::from_str(&text)
        .with_context(|| format!("parse prune config {prune_config:?}"))?;
    if cfg.packages.is_empty() {
        bail!("prune config must name at least one package");
    }

    let cancel = CancelToken::with_timeout(COMMAND_TIMEOUT);
    let mut idx = PackageIndex::new();
    Render::new(vec![from_index.to_string()])
        .with_cancel(cancel.clone())
        .index_into(&mut idx)
        .context("render index")?;

    let opts = PruneOptions {
        keep: keep || keep_heads,
        heads: keep_heads,
        permissive,
    };
    let result = prune_index(&idx, &cfg, opts, &cancel);
    if let Err(e) = idx.cleanup() {
        warn!(error = %e, "failed to clean up prune index");
    }
    let out_cfg = convert_from_model(&result?);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    write_yaml(&out_cfg, &mut out)?;
    out.flush()?;
    Ok(())
}

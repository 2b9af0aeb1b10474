use anyhow::{Context as _, Result, bail};
use reconcile::store::RestStore;
use reconcile::{Selection, Snapshot, build_tree, export_manifest};

use super::{connect_local, parse_selection};
use crate::Context;
use crate::cli::{ExportArgs, SelectArgs};
use crate::ui;

pub fn run(ctx: &Context, args: ExportArgs) -> Result<()> {
    let store = connect_local()?;
    let selection = resolve_selection(&store, &args.selection)?;
    if selection.is_empty() {
        bail!("Nothing to export");
    }

    log::info!("Exporting {} items from {}", selection.len(), store.base_url());
    let mut manifest = export_manifest(&store, &selection).context("Export failed")?;
    match store.server_info() {
        Ok(info) => manifest.directus_version = info.version,
        Err(e) => log::warn!("Could not read server version: {e}"),
    }

    match args.output {
        Some(path) => {
            manifest
                .save(&path)
                .with_context(|| format!("Could not write {}", path.display()))?;
            if !ctx.quiet {
                ui::success(&format!(
                    "Exported {} to {}",
                    ui::plural(manifest.len(), "item"),
                    path.display()
                ));
            }
        }
        None => println!("{}", serde_json::to_string_pretty(&manifest)?),
    }
    Ok(())
}

/// `--all` selects every item the store holds.
pub fn resolve_selection(store: &RestStore, args: &SelectArgs) -> Result<Selection> {
    if args.all {
        let snapshot = Snapshot::read(store)?;
        return Ok(build_tree(&snapshot).selection());
    }
    parse_selection(&args.select)
}

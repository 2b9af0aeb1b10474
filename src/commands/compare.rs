use anyhow::{Context as _, Result};
use colored::Colorize;
use reconcile::{ImportComparison, Manifest, compare_manifest_against_local};
use std::path::Path;

use super::connect_local;
use crate::Context;
use crate::ui;

pub fn run(ctx: &Context, file: &Path, json: bool) -> Result<()> {
    let manifest = load_manifest(file)?;
    let store = connect_local()?;
    let comparison = compare_manifest_against_local(&store, &manifest)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&comparison)?);
        return Ok(());
    }

    print_manifest_info(&manifest, file);
    print_comparison(ctx, &comparison);
    Ok(())
}

pub fn load_manifest(file: &Path) -> Result<Manifest> {
    Manifest::load(file).with_context(|| format!("Could not load manifest {}", file.display()))
}

pub fn print_manifest_info(manifest: &Manifest, file: &Path) {
    ui::header(&format!("Manifest {}", file.display()));
    ui::kv("Version", &manifest.format_version);
    ui::kv(
        "Exported",
        &manifest
            .exported_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
    );
    if let Some(version) = &manifest.directus_version {
        ui::kv("Directus", version);
    }
    ui::kv("Items", &manifest.len().to_string());
}

pub fn print_comparison(ctx: &Context, comparison: &ImportComparison) {
    for category in comparison.tree.categories() {
        if category.children.is_empty() {
            continue;
        }
        ui::section(&format!("{} ({})", category.name, category.children.len()));
        for item in &category.children {
            let status = item
                .status
                .map(|s| ui::status(s).to_string())
                .unwrap_or_default();
            println!("  {} {} {}", ui::checkbox(item.checked), item.name, status);
            if ctx.verbose > 0 {
                ui::dim(&item.id);
            }
            for line in &item.diff {
                println!("      {}", line.yellow());
            }
        }
    }

    let summary = &comparison.summary;
    println!();
    ui::kv("New", &summary.new.to_string());
    ui::kv("Modified", &summary.modified.to_string());
    ui::kv("Unchanged", &summary.unchanged.to_string());
    println!();
    if summary.changes() == 0 {
        ui::success("Local instance already matches the manifest");
    } else {
        ui::info(&format!(
            "{} to import",
            ui::plural(summary.changes(), "change")
        ));
    }
}

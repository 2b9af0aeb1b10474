pub mod compare;
pub mod config;
pub mod export;
pub mod import;
pub mod remote;
pub mod tree;

use anyhow::{Context as _, Result, bail};
use colored::Colorize;
use reconcile::store::RestStore;
use reconcile::{ApplyPlan, ApplyReport, FlowPlan, Kind, ManifestItem, Selection, SelectionId};

use crate::Context;
use crate::config::DsyncConfig;
use crate::ui;

/// Open the configured local instance.
pub fn connect_local() -> Result<RestStore> {
    let (config, path) = DsyncConfig::load()?;
    log::debug!("Loaded config from {}", path.display());
    config.local_connection()?.connect()
}

/// Parse `kind:id` arguments. Malformed ids and unknown kinds are skipped
/// with a warning; nothing valid at all is an error.
pub fn parse_selection(raw: &[String]) -> Result<Selection> {
    for id in raw {
        if let Err(e) = id.parse::<SelectionId>() {
            log::warn!("Ignoring '{id}': {e}");
        }
    }
    let selection = Selection::parse(raw);
    if selection.is_empty() && !raw.is_empty() {
        bail!("No valid item ids in selection (expected kind:id, e.g. role:<uuid>)");
    }
    Ok(selection)
}

/// Ask before writing; `yes` skips the prompt.
pub fn confirm(ctx: &Context, prompt: &str, yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    if ctx.quiet {
        bail!("Refusing to write without confirmation in quiet mode; pass --yes");
    }
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}

/// Print what an apply would do, in write order.
pub fn print_plan(plan: &ApplyPlan) {
    ui::header("Apply plan (dry run)");
    for kind in Kind::APPLY_ORDER {
        let items: Vec<_> = plan.of_kind(kind).collect();
        if items.is_empty() {
            continue;
        }
        ui::section(&format!("{} ({})", kind.category_name(), items.len()));
        for planned in items {
            let item = &planned.item;
            println!("  {} {}", "•".cyan(), item.label());
            ui::dim(&item.selection_id().to_string());
            if let Some(problem) = &planned.problem {
                println!("    {} {}", "✗".red(), problem.red());
                continue;
            }
            match item {
                ManifestItem::Collection(collection) => {
                    ui::dim(&format!("fields: {}", ui::plural(collection.fields.len(), "field")));
                }
                ManifestItem::Flow(flow) => {
                    if let Ok(flow_plan) = FlowPlan::build(flow) {
                        ui::dim(&format!(
                            "1) create {} unlinked",
                            ui::plural(flow_plan.create_payloads().len(), "operation")
                        ));
                        ui::dim(&format!(
                            "2) link {}",
                            ui::plural(flow_plan.link_patches().len(), "operation")
                        ));
                        match flow_plan.entry {
                            Some(entry) => ui::dim(&format!("3) set entry operation {entry}")),
                            None => ui::dim("3) no operations, flow has no entry"),
                        }
                    }
                }
                ManifestItem::Policy(policy) => {
                    ui::dim(&format!(
                        "permissions: {} (replaced)",
                        policy.permissions.len()
                    ));
                }
                ManifestItem::Role(_) => {}
            }
        }
    }
    for missing in &plan.missing {
        ui::warn(&format!("{missing} is selected but not available"));
    }
    println!();
    ui::info(&format!(
        "{} would be written. Nothing was changed.",
        ui::plural(plan.len(), "item")
    ));
}

/// Print the outcome of an apply; fails under `--strict` when any item failed.
pub fn print_report(ctx: &Context, report: &ApplyReport) -> Result<()> {
    if !ctx.quiet {
        ui::header("Summary");
        for kind in Kind::APPLY_ORDER {
            let kind_report = report.kind(kind);
            if kind_report.created + kind_report.updated + kind_report.errors.len() == 0 {
                continue;
            }
            ui::kv(
                kind.category_name(),
                &format!(
                    "{} created, {} {}, {} failed",
                    kind_report.created,
                    kind_report.updated,
                    report.direction.updated_verb(),
                    kind_report.errors.len()
                ),
            );
            for error in &kind_report.errors {
                println!("    {} {}: {}", "✗".red(), error.item, error.message.dimmed());
            }
        }
        println!();
    }

    let written = report.created() + report.updated();
    if report.has_errors() {
        ui::warn(&format!(
            "{} written, {} failed",
            ui::plural(written, "item"),
            report.error_count()
        ));
        if ctx.strict {
            bail!("{} failed to apply", ui::plural(report.error_count(), "item"));
        }
    } else if !ctx.quiet {
        ui::success(&format!("{} written", ui::plural(written, "item")));
    }
    Ok(())
}

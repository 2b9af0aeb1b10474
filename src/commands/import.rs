use anyhow::Result;
use reconcile::{ApplyPlan, compare_manifest_against_local, import_manifest};

use super::compare::{load_manifest, print_comparison, print_manifest_info};
use super::{confirm, connect_local, parse_selection, print_plan, print_report};
use crate::Context;
use crate::cli::ImportArgs;
use crate::progress::ApplyProgress;
use crate::ui;

pub fn run(ctx: &Context, args: ImportArgs) -> Result<()> {
    let manifest = load_manifest(&args.file)?;
    let store = connect_local()?;

    // Without --select, import what the comparison pre-checks: new and modified items.
    let selection = if args.select.is_empty() {
        let comparison = compare_manifest_against_local(&store, &manifest)?;
        if !ctx.quiet {
            print_manifest_info(&manifest, &args.file);
            print_comparison(ctx, &comparison);
        }
        comparison.tree.selection()
    } else {
        parse_selection(&args.select)?
    };

    if selection.is_empty() {
        if !ctx.quiet {
            ui::success("Nothing to import");
        }
        return Ok(());
    }

    let plan = ApplyPlan::from_manifest(&manifest, &selection);
    if args.apply.dry_run {
        print_plan(&plan);
        return Ok(());
    }
    for planned in plan.problems() {
        ui::warn(&format!(
            "{} will fail: {}",
            planned.item.label(),
            planned.problem.as_deref().unwrap_or_default()
        ));
    }

    let prompt = format!(
        "Import {} into {}?",
        ui::plural(plan.len(), "item"),
        store.base_url()
    );
    if !confirm(ctx, &prompt, args.apply.yes)? {
        ui::info("Import cancelled");
        return Ok(());
    }

    let mut progress = ApplyProgress::new(plan.len(), ctx.quiet, ctx.verbose > 0);
    let report = import_manifest(&store, &manifest, &selection, &mut progress)?;
    progress.finish();
    print_report(ctx, &report)
}

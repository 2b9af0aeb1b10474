use anyhow::{Context as _, Result};
use colored::Colorize;
use reconcile::normalize::field_names;
use reconcile::store::RestStore;
use reconcile::{
    ApplyPlan, ApplyReport, Comparison, Direction, Kind, RemoteComparison, SyncEntry,
    export_manifest, normalize, pull, push, scan,
};
use serde_json::Value;

use super::export::resolve_selection;
use super::{confirm, print_plan, print_report};
use crate::Context;
use crate::cli::{ApplyArgs, RemoteArgs, RemoteCommand, SelectArgs};
use crate::config::DsyncConfig;
use crate::progress::ApplyProgress;
use crate::ui;

pub fn run(ctx: &Context, cmd: RemoteCommand) -> Result<()> {
    match cmd {
        RemoteCommand::Test { remote } => test(ctx, &remote),
        RemoteCommand::Scan {
            remote,
            json,
            details,
        } => scan_remote(ctx, &remote, json, details),
        RemoteCommand::Push {
            remote,
            selection,
            apply,
        } => transfer(ctx, &remote, &selection, apply, Direction::Push),
        RemoteCommand::Pull {
            remote,
            selection,
            apply,
        } => transfer(ctx, &remote, &selection, apply, Direction::Pull),
    }
}

/// Open the local instance and the requested remote.
fn connect(args: &RemoteArgs) -> Result<(RestStore, RestStore)> {
    let (config, _) = DsyncConfig::load()?;
    let local = config.local_connection()?.connect()?;
    let remote = config
        .remote_connection(args.name.as_deref(), args.url.as_deref(), args.token.as_deref())?
        .connect()?;
    Ok((local, remote))
}

fn test(ctx: &Context, args: &RemoteArgs) -> Result<()> {
    let (local, remote) = connect(args)?;
    let (local_info, remote_info) =
        rayon::join(|| local.server_info(), || remote.server_info());

    ui::header("Connection test");
    let mut failed = None;
    for (label, store, info) in [("Local", &local, local_info), ("Remote", &remote, remote_info)] {
        ui::section(label);
        ui::kv("URL", store.base_url());
        match info {
            Ok(info) => {
                ui::kv("Project", info.project_name.as_deref().unwrap_or("(unnamed)"));
                ui::kv("Version", info.version.as_deref().unwrap_or("(hidden)"));
                if !ctx.quiet {
                    ui::success("Connected");
                }
            }
            Err(e) => {
                ui::error(&format!("{} ({})", e, e.category().advice()));
                if failed.is_none() {
                    failed = Some(e);
                }
            }
        }
    }

    match failed {
        Some(e) => Err(e).context("Connection test failed"),
        None => Ok(()),
    }
}

fn scan_remote(ctx: &Context, args: &RemoteArgs, json: bool, details: bool) -> Result<()> {
    let (local, remote) = connect(args)?;
    log::info!("Scanning {} against {}", local.base_url(), remote.base_url());
    let comparison = scan(&local, &remote)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&comparison)?);
        return Ok(());
    }

    ui::header(&format!("{} ↔ {}", local.base_url(), remote.base_url()));
    print_scan(ctx, &comparison, details);
    Ok(())
}

fn print_scan(ctx: &Context, comparison: &RemoteComparison, details: bool) {
    for kind in Kind::TREE_ORDER {
        let entries = comparison.entries(kind);
        if entries.is_empty() {
            continue;
        }
        ui::section(&format!("{} ({})", kind.category_name(), entries.len()));
        for entry in entries {
            if entry.comparison == Comparison::Identical && ctx.verbose == 0 && !details {
                continue;
            }
            println!("  {} {}", ui::comparison(entry.comparison), entry.name);
            for line in &entry.diff {
                println!("      {}", line.yellow());
            }
            if details && entry.comparison == Comparison::Different {
                print_entry_diff(entry);
            }
        }
    }

    let summary = &comparison.summary;
    println!();
    ui::kv("Local only", &summary.local_only.to_string());
    ui::kv("Remote only", &summary.remote_only.to_string());
    ui::kv("Different", &summary.different.to_string());
    ui::kv("Identical", &summary.matching.to_string());
    println!();
    if summary.local_only + summary.remote_only + summary.different == 0 {
        ui::success("Instances are in sync");
    } else {
        ui::info(&format!(
            "{} out of sync",
            ui::plural(summary.total() - summary.matching, "item")
        ));
    }
}

/// Pretty JSON of what the comparison looks at for one side.
fn comparable(value: &Value, kind: Kind) -> String {
    // Collections are compared by field names only
    let view = match kind {
        Kind::Collection => Value::from(field_names(value)),
        _ => normalize(value, kind),
    };
    serde_json::to_string_pretty(&view).unwrap_or_default()
}

fn print_entry_diff(entry: &SyncEntry) {
    let (Some(local), Some(remote)) = (&entry.local, &entry.remote) else {
        return;
    };
    let local = comparable(local, entry.kind);
    let remote = comparable(remote, entry.kind);

    let diff = similar::TextDiff::from_lines(&local, &remote);
    for change in diff.iter_all_changes() {
        match change.tag() {
            similar::ChangeTag::Delete => print!("      {}", format!("- {change}").red()),
            similar::ChangeTag::Insert => print!("      {}", format!("+ {change}").green()),
            similar::ChangeTag::Equal => {}
        }
    }
}

fn transfer(
    ctx: &Context,
    args: &RemoteArgs,
    select: &SelectArgs,
    apply: ApplyArgs,
    direction: Direction,
) -> Result<()> {
    let (local, remote) = connect(args)?;
    let (source, target) = match direction {
        Direction::Pull => (&remote, &local),
        _ => (&local, &remote),
    };

    let verb = if direction == Direction::Pull { "Pull" } else { "Push" };

    let selection = resolve_selection(source, select)?;
    if selection.is_empty() {
        if !ctx.quiet {
            ui::success(&format!("Nothing to {}", verb.to_lowercase()));
        }
        return Ok(());
    }

    if apply.dry_run {
        let manifest = export_manifest(source, &selection)
            .with_context(|| format!("Could not read items from {}", source.base_url()))?;
        print_plan(&ApplyPlan::from_manifest(&manifest, &selection));
        return Ok(());
    }

    let prompt = format!(
        "{verb} {} from {} to {}?",
        ui::plural(selection.len(), "item"),
        source.base_url(),
        target.base_url()
    );
    if !confirm(ctx, &prompt, apply.yes)? {
        ui::info("Cancelled");
        return Ok(());
    }

    let mut progress = ApplyProgress::new(selection.len(), ctx.quiet, ctx.verbose > 0);
    let report: ApplyReport = match direction {
        Direction::Pull => pull(&remote, &local, &selection, &mut progress),
        _ => push(&local, &remote, &selection, &mut progress),
    };
    progress.finish();
    print_report(ctx, &report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_comparable_drops_instance_keys() {
        let role = json!({"id": "r1", "name": "Editor", "users": ["u1"], "date_updated": "x"});
        let text = comparable(&role, Kind::Role);
        assert!(text.contains("Editor"));
        assert!(!text.contains("users"));
        assert!(!text.contains("date_updated"));
    }

    #[test]
    fn test_comparable_lists_collection_fields() {
        let collection = json!({
            "collection": "articles",
            "meta": {"icon": "article"},
            "fields": [{"field": "title"}, {"field": "id"}]
        });
        let text = comparable(&collection, Kind::Collection);
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!(["id", "title"]));
    }
}

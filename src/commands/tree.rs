use anyhow::Result;
use colored::Colorize;
use reconcile::{Snapshot, Tree, build_tree};

use super::connect_local;
use crate::Context;
use crate::ui;

pub fn run(ctx: &Context, json: bool) -> Result<()> {
    let store = connect_local()?;
    log::info!("Reading local instance at {}", store.base_url());
    let snapshot = Snapshot::read(&store)?;
    let tree = build_tree(&snapshot);

    if json {
        println!("{}", serde_json::to_string_pretty(&tree)?);
        return Ok(());
    }

    print_tree(ctx, &tree);
    Ok(())
}

/// Plain listing of categories and their items.
pub fn print_tree(ctx: &Context, tree: &Tree) {
    ui::header("Local instance");
    for category in tree.categories() {
        ui::section(&format!("{} ({})", category.name, category.children.len()));
        if category.children.is_empty() {
            ui::dim("(none)");
            continue;
        }
        for item in &category.children {
            if ctx.verbose > 0 {
                println!("  {} {} {}", ui::checkbox(item.checked), item.name, item.id.dimmed());
            } else {
                println!("  {} {}", ui::checkbox(item.checked), item.name);
            }
        }
    }
    println!();
    ui::info(&format!(
        "{} selected of {}",
        tree.selected_ids().len(),
        ui::plural(tree.item_count(), "item")
    ));
}

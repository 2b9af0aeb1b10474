use colored::{ColoredString, Colorize};
use reconcile::{Comparison, ImportStatus, ItemOutcome};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Checkbox for a tree node
pub fn checkbox(checked: bool) -> ColoredString {
    if checked { "[x]".green() } else { "[ ]".dimmed() }
}

/// Colored label for an import status
pub fn status(status: ImportStatus) -> ColoredString {
    match status {
        ImportStatus::New => "new".green().bold(),
        ImportStatus::Modified => "modified".yellow().bold(),
        ImportStatus::Unchanged => "unchanged".dimmed(),
        ImportStatus::Missing => "missing".red(),
    }
}

/// Colored label for a remote comparison
pub fn comparison(comparison: Comparison) -> ColoredString {
    let label = comparison.label();
    match comparison {
        Comparison::Identical => label.dimmed(),
        Comparison::Different => label.yellow().bold(),
        Comparison::LocalOnly => label.green(),
        Comparison::RemoteOnly => label.blue(),
    }
}

/// Symbol for an applied item
pub fn outcome_symbol(outcome: &ItemOutcome) -> ColoredString {
    match outcome {
        ItemOutcome::Created => "+".green(),
        ItemOutcome::Updated => "~".yellow(),
        ItemOutcome::Failed { .. } => "✗".red(),
    }
}

/// Pluralize a count: `plural(1, "item")` is "1 item", `plural(2, "item")` is "2 items".
pub fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

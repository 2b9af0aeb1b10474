use anyhow::{Result, bail};

use crate::Context;
use crate::cli::ConfigCommand;
use crate::config::{Connection, DsyncConfig, ENV_LOCAL_TOKEN, ENV_LOCAL_URL};
use crate::paths;
use crate::ui;

pub fn run(ctx: &Context, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show => show(ctx),
        ConfigCommand::Validate => validate(ctx),
    }
}

fn show(ctx: &Context) -> Result<()> {
    let (config, path) = DsyncConfig::load()?;

    ui::header("Configuration");
    ui::kv("Config directory", &paths::config_dir()?.display().to_string());
    ui::kv(
        "Config file",
        &if path.exists() {
            path.display().to_string()
        } else {
            format!("{} (not found)", path.display())
        },
    );

    ui::section("Local");
    match config.local_connection() {
        Ok(local) => print_connection(ctx, &local),
        Err(e) => ui::dim(&e.to_string()),
    }

    ui::section("Remotes");
    if config.remotes.is_empty() {
        ui::dim("None configured. Add a [remotes.<name>] table to config.toml.");
    }
    for (name, remote) in &config.remotes {
        println!("  {name}");
        print_connection(ctx, remote);
    }

    println!();
    ui::dim(&format!("{ENV_LOCAL_URL} and {ENV_LOCAL_TOKEN} override [local]."));
    Ok(())
}

fn print_connection(ctx: &Context, connection: &Connection) {
    ui::kv("url", &connection.url);
    ui::kv("token", &connection.masked_token());
    if ctx.verbose > 0 {
        ui::kv("timeout", &format!("{}s", connection.timeout().as_secs()));
    }
}

fn validate(ctx: &Context) -> Result<()> {
    let (config, path) = DsyncConfig::load()?;
    if !path.exists() {
        ui::warn(&format!("No config file at {}", path.display()));
    }

    let report = config.validate();
    if report.is_empty() {
        if !ctx.quiet {
            let count = usize::from(config.local.is_some()) + config.remotes.len();
            ui::success(&format!("{} valid", ui::plural(count, "connection")));
        }
        return Ok(());
    }

    for (name, problems) in &report {
        for problem in problems {
            ui::error(&format!("{name}: {problem}"));
        }
    }
    bail!("Invalid configuration in {}", path.display())
}

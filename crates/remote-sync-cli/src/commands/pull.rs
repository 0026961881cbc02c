use super::{json_pretty, spin_fail, spin_ok, spinner, Context, EXIT_SUCCESS};
use remote_sync_core::PullResult;

pub fn run_database(ctx: &Context<'_>, filename: &str, emergency_backup: bool) -> Result<u8, String> {
    ctx.config.require_database()?;
    let engine = ctx.engine(emergency_backup)?;

    let pb = spinner(&format!("restoring database from {filename}…"));
    let result = engine.pull_database(filename).map_err(|e| {
        spin_fail(&pb, "database pull failed");
        e.to_string()
    })?;
    spin_ok(&pb, "database restored");

    report(ctx, &result)?;
    Ok(EXIT_SUCCESS)
}

pub fn run_volumes(ctx: &Context<'_>, filename: &str, emergency_backup: bool) -> Result<u8, String> {
    let engine = ctx.engine(emergency_backup)?;

    let pb = spinner(&format!("restoring volumes from {filename}…"));
    let result = engine.pull_volumes(filename).map_err(|e| {
        spin_fail(&pb, "volumes pull failed");
        e.to_string()
    })?;
    spin_ok(&pb, "volumes restored");

    report(ctx, &result)?;
    if !ctx.json {
        if !result.restored_volumes.is_empty() {
            println!("restored volumes: {}", result.restored_volumes.join(", "));
        }
        if !result.skipped_entries.is_empty() {
            println!(
                "skipped archive entries with no matching volume: {}",
                result.skipped_entries.join(", ")
            );
        }
    }
    Ok(EXIT_SUCCESS)
}

fn report(ctx: &Context<'_>, result: &PullResult) -> Result<(), String> {
    if ctx.json {
        println!("{}", json_pretty(result)?);
    } else {
        println!("restored from {}", result.filename);
        if let Some(path) = &result.emergency_backup {
            println!("emergency backup kept at {}", path.display());
        }
    }
    Ok(())
}

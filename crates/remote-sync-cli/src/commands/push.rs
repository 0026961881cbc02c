use super::{json_pretty, spin_fail, spin_ok, spinner, Context, EXIT_SUCCESS};

pub fn run_database(ctx: &Context<'_>) -> Result<u8, String> {
    ctx.config.require_database()?;
    let engine = ctx.engine(true)?;

    let pb = spinner("dumping and uploading database…");
    let filename = engine.push_database().map_err(|e| {
        spin_fail(&pb, "database push failed");
        e.to_string()
    })?;
    spin_ok(&pb, "database push complete");

    if ctx.json {
        let payload = serde_json::json!({
            "kind": "database",
            "filename": filename,
            "provider": engine.provider_name(),
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("pushed {filename}");
    }
    Ok(EXIT_SUCCESS)
}

pub fn run_volumes(ctx: &Context<'_>) -> Result<u8, String> {
    let engine = ctx.engine(true)?;

    let pb = spinner("archiving and uploading volumes…");
    let filename = engine.push_volumes().map_err(|e| {
        spin_fail(&pb, "volumes push failed");
        e.to_string()
    })?;
    spin_ok(&pb, "volumes push complete");

    if ctx.json {
        let payload = serde_json::json!({
            "kind": "volumes",
            "filename": filename,
            "provider": engine.provider_name(),
        });
        println!("{}", json_pretty(&payload)?);
    } else if let Some(filename) = filename {
        println!("pushed {filename}");
    } else {
        println!("no volumes registered; nothing pushed");
    }
    Ok(EXIT_SUCCESS)
}

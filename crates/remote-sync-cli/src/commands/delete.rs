use super::{json_pretty, Context, EXIT_SUCCESS};
use remote_sync_schema::ArtifactKind;

pub fn run(ctx: &Context<'_>, kind: ArtifactKind, filename: &str) -> Result<u8, String> {
    if !filename.ends_with(kind.suffix()) {
        return Err(format!("'{filename}' is not a {kind} backup (expected {})", kind.suffix()));
    }
    let engine = ctx.engine(false)?;
    let deleted = match kind {
        ArtifactKind::Database => engine.delete_database(filename),
        ArtifactKind::Volumes => engine.delete_volume(filename),
    };
    deleted.map_err(|e| e.to_string())?;

    if ctx.json {
        println!("{}", json_pretty(&serde_json::json!({ "deleted": filename }))?);
    } else {
        println!("deleted {filename}");
    }
    Ok(EXIT_SUCCESS)
}

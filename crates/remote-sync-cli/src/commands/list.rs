use super::{json_pretty, Context, EXIT_SUCCESS};
use remote_sync_schema::{ArtifactKind, Catalog};

pub fn run(ctx: &Context<'_>, kind: ArtifactKind) -> Result<u8, String> {
    let engine = ctx.engine(false)?;
    let catalog: Catalog = match kind {
        ArtifactKind::Database => engine.database_catalog(),
        ArtifactKind::Volumes => engine.volume_catalog(),
    }
    .map_err(|e| e.to_string())?;

    if ctx.json {
        println!("{}", json_pretty(&catalog.options())?);
    } else if catalog.is_empty() {
        println!("no {kind} backups found");
    } else {
        println!("{:<28} FILENAME", "CREATED");
        for backup in &catalog.backups {
            println!("{:<28} {}", backup.label, backup.filename);
        }
    }
    Ok(EXIT_SUCCESS)
}

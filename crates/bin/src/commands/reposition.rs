use positioning::PositionRequest;

use crate::backend::open_instance;
use crate::cli::{BackendConfig, MoveArgs};
use crate::output::{OutputFormat, print_json};

/// The target named on the command line; clap guarantees exactly one is set.
fn request(args: &MoveArgs) -> PositionRequest {
    if let Some(position) = args.to {
        PositionRequest::At(position)
    } else if args.first {
        PositionRequest::First
    } else if let Some(id) = args.before {
        PositionRequest::Before(Some(id))
    } else if let Some(id) = args.after {
        PositionRequest::After(Some(id))
    } else {
        PositionRequest::Last
    }
}

pub async fn run(
    backend: &BackendConfig,
    args: &MoveArgs,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let column = &args.column;
    let instance = open_instance(backend, column).await?;
    let mut record = instance
        .find(&column.table, args.id)
        .await?
        .ok_or_else(|| format!("no row {} in {}", args.id, column.table))?;

    let request = request(args);
    let from = record.position(&column.column);
    record.set_position(column.column.as_str(), request.clone());
    instance.update(&mut record).await?;
    let to = record.position(&column.column);

    tracing::info!(id = args.id, %request, ?from, ?to, "Moved row");
    match format {
        OutputFormat::Human => match (from, to) {
            (Some(from), Some(to)) if from == to => {
                println!("Row {} stays at position {to}", args.id)
            }
            (Some(from), Some(to)) => println!("Row {} moved from {from} to {to}", args.id),
            (_, to) => println!(
                "Row {} placed at position {}",
                args.id,
                to.map(|p| p.to_string()).unwrap_or_else(|| "NULL".into())
            ),
        },
        OutputFormat::Json => print_json(&serde_json::json!({
            "id": args.id,
            "request": request.to_string(),
            "from": from,
            "to": to,
        }))?,
    }
    Ok(())
}

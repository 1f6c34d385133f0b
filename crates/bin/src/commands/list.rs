use crate::backend::open_instance;
use crate::cli::{BackendConfig, ListArgs};
use crate::output::{OutputFormat, cell, print_json, print_table};

/// Prints the rows sharing a scope with `--id`, in position order.
pub async fn run(
    backend: &BackendConfig,
    args: &ListArgs,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let column = &args.column;
    let instance = open_instance(backend, column).await?;
    let record = instance
        .find(&column.table, args.id)
        .await?
        .ok_or_else(|| format!("no row {} in {}", args.id, column.table))?;

    let config = instance
        .registry()
        .configuration(&column.table, &column.column)?;
    let scope = config.scope_of(&record);
    let siblings = instance.siblings(&record, &column.column).await?;

    match format {
        OutputFormat::Human => {
            println!("Scope {scope}: {} row(s)", siblings.len());
            let rows: Vec<Vec<String>> = siblings
                .iter()
                .map(|sibling| {
                    let marker = if sibling.id() == Some(args.id) { "*" } else { "" };
                    vec![
                        cell(sibling.get(&column.column)),
                        sibling.id().map(|id| id.to_string()).unwrap_or_default(),
                        marker.to_string(),
                    ]
                })
                .collect();
            print_table(&["POSITION", "ID", ""], &rows);
        }
        OutputFormat::Json => {
            let rows: Vec<serde_json::Value> = siblings
                .iter()
                .map(|sibling| {
                    serde_json::json!({
                        "id": sibling.id(),
                        "position": sibling.position(&column.column),
                    })
                })
                .collect();
            print_json(&serde_json::json!({
                "scope": scope,
                "rows": rows,
            }))?;
        }
    }
    Ok(())
}

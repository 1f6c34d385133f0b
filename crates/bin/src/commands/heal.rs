use crate::backend::open_instance;
use crate::cli::{BackendConfig, ColumnArgs};
use crate::output::{OutputFormat, print_json};

pub async fn run(
    backend: &BackendConfig,
    args: &ColumnArgs,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let instance = open_instance(backend, args).await?;
    let report = instance.heal(&args.table, &args.column).await?;

    match format {
        OutputFormat::Human => {
            println!(
                "{}.{}: renumbered {} of {} row(s) across {} scope(s)",
                report.entity, report.column, report.renumbered, report.rows, report.scopes
            );
        }
        OutputFormat::Json => print_json(&serde_json::to_value(&report)?)?,
    }
    Ok(())
}

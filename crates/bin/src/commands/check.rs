use positioning::instance::ScopeReport;

use crate::backend::open_instance;
use crate::cli::{BackendConfig, ColumnArgs};
use crate::output::{OutputFormat, join_positions, print_json, print_table};

/// Reports every scope of the column. Returns whether all of them are dense.
pub async fn run(
    backend: &BackendConfig,
    args: &ColumnArgs,
    format: OutputFormat,
) -> Result<bool, Box<dyn std::error::Error>> {
    let instance = open_instance(backend, args).await?;
    let reports = instance.verify(&args.table, &args.column).await?;
    let dense = reports.iter().all(ScopeReport::is_dense);

    match format {
        OutputFormat::Human => {
            let rows: Vec<Vec<String>> = reports.iter().map(report_row).collect();
            print_table(
                &["SCOPE", "ROWS", "GAPS", "DUPLICATES", "UNPOSITIONED"],
                &rows,
            );
            let broken = reports.iter().filter(|r| !r.is_dense()).count();
            println!();
            if broken == 0 {
                println!(
                    "{}.{}: {} scope(s), all dense",
                    args.table,
                    args.column,
                    reports.len()
                );
            } else {
                println!(
                    "{}.{}: {broken} of {} scope(s) need healing",
                    args.table,
                    args.column,
                    reports.len()
                );
            }
        }
        OutputFormat::Json => {
            print_json(&serde_json::json!({
                "table": args.table,
                "column": args.column,
                "dense": dense,
                "scopes": reports,
            }))?;
        }
    }

    Ok(dense)
}

fn report_row(report: &ScopeReport) -> Vec<String> {
    vec![
        report.scope.to_string(),
        report.count.to_string(),
        join_positions(&report.gaps),
        join_positions(&report.duplicates),
        report.unpositioned.to_string(),
    ]
}

//! Query command: runs a paginated query against a seeded mock.

use super::TraceEntry;
use recflow_core::{Demand, FlowResult, OperationConfig, Publisher, Query, Record, Recorder};
use recflow_testkit::{numbers, seeded_cloud, TestDatabase, NOTE};
use serde::Serialize;
use tracing::debug;

/// Outcome of one query run.
#[derive(Debug, Serialize)]
pub struct QueryResult {
    /// Records seeded into the mock.
    pub seeded: usize,
    /// Results limit per page.
    pub page_size: usize,
    /// Demand signalled, or `"unlimited"`.
    pub demand: String,
    /// Items delivered.
    pub delivered: usize,
    /// Page operations issued.
    pub pages: usize,
    /// Whether the stream reached a terminal emission.
    pub finished: bool,
    /// Every emission, in delivery order.
    pub trace: Vec<TraceEntry>,
}

/// Runs the query command.
pub fn run(
    items: usize,
    page_size: usize,
    demand: Option<u64>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = execute(items, page_size, demand)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Seeds a mock with `items` notes and queries them `page_size` at a time.
pub fn execute(items: usize, page_size: usize, demand: Option<u64>) -> FlowResult<QueryResult> {
    let test_db = TestDatabase::inline(seeded_cloud(items));
    debug!(items, "seeded mock cloud");

    let config = OperationConfig::new().with_results_limit(page_size);
    let query = test_db.query(Query::new(NOTE), config)?;
    let demand = demand.map_or_else(Demand::unlimited, Demand::max);

    let recorder: Recorder<_, Record> = Recorder::new();
    query.subscribe(recorder.clone()).request(demand);

    let trace = recorder
        .emissions()
        .iter()
        .map(|emission| {
            TraceEntry::from_emission(emission, |record| {
                numbers(std::slice::from_ref(record))
                    .first()
                    .map_or_else(|| record.id.to_string(), |n| format!("n={n}"))
            })
        })
        .collect();

    Ok(QueryResult {
        seeded: items,
        page_size,
        demand: demand.to_string(),
        delivered: recorder.items().len(),
        pages: test_db.cloud.operations(),
        finished: recorder.terminal_count() > 0,
        trace,
    })
}

fn print_text_output(result: &QueryResult) {
    println!("Query");
    println!("=====");
    println!("Seeded:    {}", result.seeded);
    println!("Page size: {}", result.page_size);
    println!("Demand:    {}", result.demand);
    println!();

    for entry in &result.trace {
        println!("  {entry}");
    }
    println!();

    println!("Delivered: {}", result.delivered);
    println!("Pages:     {}", result.pages);
    if !result.finished {
        println!("Stream still open, waiting for demand");
    }
}

// Local crates
use crate::loader::{Function, Value};
use crate::resolver::Route;

// External crates
use anyhow::{Context, Result};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Counters reported once every route has been drained.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub routes: usize,
    pub records_read: usize,
    pub records_written: usize,
    pub records_skipped: usize,
    pub cancelled: bool,
}

/// Default pipeline engine: drains every route in order, one record at a
/// time.
///
/// Cancellation is checked between records; the record in flight is always
/// finished.
#[instrument(
    name = "route_runner::run_routes",
    target = "pipeline::runner",
    level = "info",
    skip_all,
    fields(routes = routes.len())
)]
pub async fn run_routes(routes: Vec<Route>, cancel: &CancellationToken) -> Result<RunSummary> {
    let mut summary = RunSummary::default();

    for (index, route) in routes.into_iter().enumerate() {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }

        run_route(route, cancel, &mut summary)
            .await
            .with_context(|| format!("route #{index} failed"))?;
        summary.routes += 1;
        tracing::debug!(route = index, "Route drained");

        if summary.cancelled {
            break;
        }
    }

    if summary.cancelled {
        tracing::warn!(completed = summary.routes, "Run cancelled before all routes completed");
    }
    tracing::info!(
        routes = summary.routes,
        read = summary.records_read,
        written = summary.records_written,
        skipped = summary.records_skipped,
        "Run finished"
    );
    Ok(summary)
}

async fn run_route(route: Route, cancel: &CancellationToken, summary: &mut RunSummary) -> Result<()> {
    let Route {
        from: mut reader,
        to: writer,
        controller,
    } = route;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                summary.cancelled = true;
                return Ok(());
            }
            next = reader.next() => next,
        };
        let Some(record) = next else {
            return Ok(());
        };
        let record = record.context("reader failed")?;
        summary.records_read += 1;

        let Some(controller) = &controller else {
            write(&writer, record).await?;
            summary.records_written += 1;
            continue;
        };

        match controller.call(record).await.context("controller failed")? {
            Value::Null => {
                tracing::trace!("Record skipped by controller");
                summary.records_skipped += 1;
            }
            Value::List(records) => {
                for record in records {
                    write(&writer, record).await?;
                    summary.records_written += 1;
                }
            }
            record => {
                write(&writer, record).await?;
                summary.records_written += 1;
            }
        }
    }
}

async fn write(writer: &Function, record: Value) -> Result<()> {
    writer
        .call(None, vec![record])
        .await
        .with_context(|| format!("writer '{}' failed", writer.name()))?;
    Ok(())
}

use anyhow::{Context, Result};
use sheetkpi::{
    align, common_columns, fetch, kpi, HeaderLayout, SheetsClient, TimeSeriesStore, TotalsConfig,
};
use std::env;
use std::path::Path;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sheetkpi=info"));
    fmt::Subscriber::builder().with_env_filter(env_filter).init();
    info!("startup");

    // With a path argument, analyze a local CSV export instead of the
    // remote spreadsheet.
    match env::args().nth(1) {
        Some(path) => run_local(Path::new(&path)),
        None => run_remote().await,
    }
}

async fn run_remote() -> Result<()> {
    let spreadsheet_id = env::var("SPREADSHEET_ID")
        .context("SPREADSHEET_ID must be set to the source spreadsheet's id")?;
    let api_key = env::var("SHEETS_API_KEY")
        .context("SHEETS_API_KEY must be set to a Google Sheets API key")?;
    let client = SheetsClient::new(spreadsheet_id, api_key);

    let entities = client.entity_sheets().await?;
    if entities.is_empty() {
        info!("spreadsheet holds no data sheets; nothing to analyze");
        return Ok(());
    }
    info!(count = entities.len(), "discovered entity sheets");

    let totals = TotalsConfig::new(client.totals_kpis().await?);

    // per-entity fetches are independent; run them concurrently
    let fetches = entities.iter().map(|name| {
        let client = &client;
        async move { (name.clone(), client.grid(name).await) }
    });
    let results = futures::future::join_all(fetches).await;

    let mut stores = Vec::with_capacity(results.len());
    for (name, result) in results {
        match result {
            Ok(grid) => {
                let store = TimeSeriesStore::from_grid(&name, &grid, HeaderLayout::Single);
                if store.is_empty() {
                    warn!(entity = %name, "sheet has no usable rows");
                } else {
                    info!(entity = %name, rows = store.len(), columns = store.columns().len(), "normalized");
                    stores.push(store);
                }
            }
            Err(err) => error!(entity = %name, error = %err, "fetch failed"),
        }
    }

    report(&stores, &totals);
    Ok(())
}

fn run_local(path: &Path) -> Result<()> {
    let grid = fetch::grid::from_csv_path(path)?;
    let entity = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("local")
        .to_string();
    let store = TimeSeriesStore::from_grid(&entity, &grid, HeaderLayout::Single);
    if store.is_empty() {
        warn!(entity = %entity, "no usable rows in export");
        return Ok(());
    }

    let totals = TotalsConfig::default();
    report(std::slice::from_ref(&store), &totals);

    let cards = kpi::summary_cards(&store, &totals, None);
    println!("{}", serde_json::to_string_pretty(&cards)?);
    Ok(())
}

fn report(stores: &[TimeSeriesStore], totals: &TotalsConfig) {
    for store in stores {
        for card in kpi::summary_cards(store, totals, None) {
            info!(
                entity = store.entity(),
                column = %card.column,
                aggregation = ?card.aggregation,
                value = card.value,
                growth_pct = card.growth_pct,
                alert = card.alert,
                "summary"
            );
        }
        for column in store.columns() {
            let Some(series) = store.series(column) else { continue };
            let result = kpi::analyze(&series, kpi::DEFAULT_RECENT_WINDOW);
            if result.insufficient {
                continue;
            }
            match kpi::naive_forecast(&series, 1) {
                Some(next) => info!(
                    entity = store.entity(),
                    column = %column,
                    trend = %result.trend,
                    growth_pct = result.growth_pct,
                    forecast_next = next,
                    "kpi"
                ),
                None => info!(
                    entity = store.entity(),
                    column = %column,
                    trend = %result.trend,
                    growth_pct = result.growth_pct,
                    "kpi (forecast unavailable)"
                ),
            }
        }
    }

    if stores.len() > 1 {
        let common = common_columns(stores);
        if common.is_empty() {
            info!("no comparable indicator exists across the entities");
            return;
        }
        for column in &common {
            match align(stores, column, None) {
                Ok(aligned) => info!(
                    column = %column,
                    axis_points = aligned.date_axis.len(),
                    entities = aligned.per_entity.len(),
                    "aligned"
                ),
                Err(err) => warn!(column = %column, error = %err, "alignment failed"),
            }
        }
    }
}

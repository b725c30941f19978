use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use dutyplan::catalog::{CatalogFile, InMemoryCatalog};
use dutyplan::directory::InMemoryDirectory;
use dutyplan::engine::{Collaborators, Engine};
use dutyplan::notify::NotifyHub;
use dutyplan::rules::{ConflictPolicy, NoRules};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("DUTYPLAN_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    dutyplan::observability::init(metrics_port);

    let data_dir = std::env::var("DUTYPLAN_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let catalog_path = std::env::var("DUTYPLAN_CATALOG").ok();
    let compact_threshold: u64 = std::env::var("DUTYPLAN_COMPACT_THRESHOLD")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);
    let conflict_policy: ConflictPolicy = match std::env::var("DUTYPLAN_CONFLICT_POLICY") {
        Ok(s) => s.parse()?,
        Err(_) => ConflictPolicy::default(),
    };

    // Ensure data directory exists
    std::fs::create_dir_all(&data_dir)?;

    let (catalog, directory) = match &catalog_path {
        Some(path) => CatalogFile::load(std::path::Path::new(path))?.into_collaborators(),
        None => (InMemoryCatalog::new(), InMemoryDirectory::new()),
    };
    info!(
        "catalog: {} template(s), {} resource(s)",
        catalog.template_count(),
        directory.resource_count()
    );

    let collaborators = Collaborators {
        catalog: Arc::new(catalog),
        directory: Arc::new(directory),
        rules: Arc::new(NoRules),
    };
    let wal_path = PathBuf::from(&data_dir).join("dutyplan.wal");
    let engine = Arc::new(
        Engine::new(wal_path, collaborators, Arc::new(NotifyHub::new()))?
            .with_conflict_policy(conflict_policy),
    );

    let compactor_engine = engine.clone();
    tokio::spawn(async move {
        dutyplan::compactor::run_compactor(compactor_engine, compact_threshold).await;
    });

    info!("dutyplan started");
    info!("  data_dir: {data_dir}");
    info!("  catalog: {}", catalog_path.as_deref().unwrap_or("none"));
    info!("  services: {}", engine.service_count());
    info!("  conflict policy: {:?}", engine.conflict_policy());
    info!("  metrics: {}", metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }

    info!("shutdown signal received");
    if dutyplan::compactor::compact_if_due(&engine, 1).await {
        info!("final snapshot written");
    }
    info!("dutyplan stopped");
    Ok(())
}

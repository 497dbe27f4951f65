//! `memoria models`: Show the model catalog and current health.

pub async fn run(probe: bool) -> Result<(), Box<dyn std::error::Error>> {
    let (config, service) = super::load_service().await?;

    if probe {
        let report = service
            .health_probe(std::time::Duration::from_secs(config.probe.interval_secs))
            .sweep()
            .await;
        println!(
            "Probe: {} healthy, {} unavailable, {} skipped",
            report.healthy.len(),
            report.unavailable.len(),
            report.skipped.len()
        );
        println!();
    }

    println!("Models (generic: {})", config.router.generic_model);
    println!("==================");
    for (id, status) in service.model_status() {
        println!(
            "  {:<20} rank {:>3}  {:<12} [{}]",
            id,
            status.priority_rank,
            status.state.as_str(),
            status.tags.join(", ")
        );
    }

    Ok(())
}

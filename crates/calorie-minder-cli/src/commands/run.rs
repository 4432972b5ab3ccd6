use calorie_minder_core::{shutdown_channel, Service};

use super::{load_config, open_store, runtime};

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let store = open_store()?;
    let service = Service::new(store, config)?;

    runtime()?.block_on(async move {
        let (trigger, shutdown) = shutdown_channel();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Ctrl-C received, finishing current work"),
                Err(err) => tracing::error!("cannot listen for Ctrl-C: {err}"),
            }
            trigger.trigger();
        });
        service.run(shutdown).await
    })?;
    Ok(())
}

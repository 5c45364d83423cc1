//! Wiring shared by commands that prepare indexes

use crate::cli::args::IndexOptions;
use crate::clock::Clock;
use crate::config::{Config, ConfigManager};
use crate::events::EventLog;
use crate::index::{IndexCoordinator, JavaIndexBuilder};
use crate::lock::default_owner;
use crate::supervisor::ProcessSupervisor;
use crate::system::HostProbe;
use std::sync::Arc;

/// Fold command-line overrides into the loaded configuration
pub fn apply_index_options(config: &Config, options: &IndexOptions) -> Config {
    let mut config = config.clone();
    if options.offline {
        config.cache.offline = true;
    }
    if let Some(hours) = options.max_wait_hours {
        config.lock.max_wait_hours = hours;
    }
    if let Some(mb) = options.memory_mb {
        config.index.memory_hint_mb = mb;
    }
    config
}

/// Identity written into lock markers and manifests
pub fn owner(config: &Config) -> String {
    config
        .general
        .manager_name
        .clone()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(default_owner)
}

/// Coordinator backed by the host, the real tool and the event journal
pub fn coordinator(config: &Config, clock: Arc<dyn Clock>) -> IndexCoordinator {
    let supervisor = ProcessSupervisor::from_config(clock.clone(), &config.supervisor);
    let builder = JavaIndexBuilder::from_config(&config.tool, supervisor, ConfigManager::console_dir());

    IndexCoordinator::new(
        config,
        clock.clone(),
        Arc::new(builder),
        Arc::new(HostProbe),
        owner(config),
    )
    .with_events(EventLog::new(config, clock))
}

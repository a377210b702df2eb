mod feed;
mod replay;
mod simulate;

use std::sync::Arc;
use std::time::Duration;

use relay_api::TelemetrySource;

use crate::config::SourceConfig;

pub use feed::FeedSource;
pub use replay::ReplaySource;
pub use simulate::SimulateSource;

/// Построить source по конфигу.
pub fn build_source(cfg: &SourceConfig) -> Arc<dyn TelemetrySource> {
    match cfg {
        SourceConfig::Feed(c) => {
            Arc::new(FeedSource::new(c.addr.clone()).with_max_line_bytes(c.max_line_bytes))
        }
        SourceConfig::Replay(c) => Arc::new(ReplaySource::new(
            c.path.clone(),
            Duration::from_millis(c.interval_ms),
            c.looped,
        )),
        SourceConfig::Simulate(c) => Arc::new(SimulateSource::new(
            c.cars,
            Duration::from_millis(c.interval_ms),
            c.seed,
        )),
    }
}

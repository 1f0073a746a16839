pub mod health;
pub mod logging;
pub mod metrics;

pub use health::{AggregatedHealth, DependencyHealth, HealthChecker, HealthStatus};
pub use logging::{init_logging, mask_sensitive, mask_uuid, LogConfig, LogFormat};
pub use metrics::{get_metrics, init_metrics, LatencyTimer, Metrics, METRICS};

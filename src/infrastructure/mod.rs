// Infrastructure layer: process sampling and log output

pub mod logging;
pub mod sampler;

pub use logging::{init_logging, LogFormat, LoggingError};
pub use sampler::{ResourceSampler, SampledRun, UsageSample};

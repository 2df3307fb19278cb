//! Per-fetch stage timing that compiles to nothing without the `profiling` feature.

use crate::common::*;

/// Reads `HUMANDATA_PROFILING_WHITELIST`, a comma-separated list of timing names to report.
///
/// Every timing is reported if the variable is unset.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProfilingConfig {
    pub profiling_whitelist: Option<HashSet<String>>,
}

impl ProfilingConfig {
    pub fn allows(&self, name: &str) -> bool {
        self.profiling_whitelist
            .as_ref()
            .map_or(true, |whitelist| whitelist.contains(name))
    }
}

#[cfg(feature = "profiling")]
mod registry {
    use super::*;
    use dashmap::DashSet;
    use lazy_static::lazy_static;

    lazy_static! {
        pub static ref PROFILING_CONFIG: ProfilingConfig = envy::prefixed("HUMANDATA_")
            .from_env::<ProfilingConfig>()
            .unwrap_or_else(|err| {
                warn!("ignore malformed profiling variables: {}", err);
                ProfilingConfig::default()
            });
        pub static ref SEEN_TIMINGS: DashSet<&'static str> = DashSet::new();
    }
}

/// Stage durations of one named operation.
#[cfg(feature = "profiling")]
#[derive(Debug)]
pub struct Timing {
    name: &'static str,
    since: Instant,
    stages: Vec<(&'static str, Duration)>,
}

#[cfg(not(feature = "profiling"))]
#[derive(Debug)]
pub struct Timing;

#[cfg(feature = "profiling")]
impl Timing {
    pub fn new(name: &'static str) -> Self {
        if registry::SEEN_TIMINGS.insert(name) {
            debug!("profiling '{}'", name);
        }

        Self {
            name,
            since: Instant::now(),
            stages: vec![],
        }
    }

    /// Close the running stage under `stage` and start the next one.
    pub fn set_record(&mut self, stage: &'static str) {
        let now = Instant::now();
        self.stages.push((stage, now - self.since));
        self.since = now;
    }

    pub fn total(&self) -> Duration {
        self.stages.iter().map(|(_, elapsed)| *elapsed).sum()
    }

    /// Log every recorded stage on one line.
    pub fn report(&self) {
        if !registry::PROFILING_CONFIG.allows(self.name) {
            return;
        }

        let stages = self
            .stages
            .iter()
            .map(|(stage, elapsed)| format!("{} {:.2?}", stage, elapsed))
            .join(", ");
        info!("{} took {:.2?}: {}", self.name, self.total(), stages);
    }
}

#[cfg(not(feature = "profiling"))]
impl Timing {
    pub fn new(_name: &'static str) -> Self {
        Self
    }

    pub fn set_record(&mut self, _stage: &'static str) {}

    pub fn total(&self) -> Duration {
        Duration::ZERO
    }

    pub fn report(&self) {}
}

use std::fmt;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::aggregate::AggregateError;
use crate::caller::read_call_run_id;
use crate::genomics::{write_atomically, Region};
use crate::layout::UnitPaths;

const MANIFEST_FORMAT_VERSION: u32 = 2;
/// Manifests written before runs carried an id.
const LEGACY_FORMAT_VERSION: u32 = 1;

/// One `(sample, region)` unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitKey {
    pub sample_id: String,
    pub region: Region,
}

impl UnitKey {
    pub fn new(sample_id: impl Into<String>, region: Region) -> Self {
        Self {
            sample_id: sample_id.into(),
            region,
        }
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.sample_id, self.region)
    }
}

/// Units a run is expected to produce, written before any unit starts.
///
/// Every call file written inside the run carries the manifest's `run_id`;
/// a call file with any other id was left behind by an earlier run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    pub format_version: u32,
    #[serde(default)]
    pub run_id: Option<String>,
    pub panel_version: String,
    pub panel_fingerprint: String,
    pub units: Vec<UnitKey>,
}

fn new_run_id(panel_fingerprint: &str, units: &[UnitKey]) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_nanos());
    let mut hasher = blake3::Hasher::new();
    hasher.update(&nanos.to_le_bytes());
    hasher.update(&std::process::id().to_le_bytes());
    hasher.update(panel_fingerprint.as_bytes());
    for unit in units {
        hasher.update(unit.to_string().as_bytes());
    }
    hasher.finalize().to_hex()[..16].to_string()
}

impl RunManifest {
    /// Manifest expecting both regions for every sample, in the given order.
    pub fn new<I, S>(panel_version: &str, panel_fingerprint: &str, samples: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let units = samples
            .into_iter()
            .map(Into::into)
            .flat_map(|sample: String| {
                Region::ALL.map(|region| UnitKey::new(sample.clone(), region))
            })
            .collect::<Vec<_>>();
        Self {
            format_version: MANIFEST_FORMAT_VERSION,
            run_id: Some(new_run_id(panel_fingerprint, &units)),
            panel_version: panel_version.to_string(),
            panel_fingerprint: panel_fingerprint.to_string(),
            units,
        }
    }

    /// Replace the generated run id.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Whether a call file stamped with `run_id` belongs to this run.
    /// Legacy manifests carry no id and accept every call file.
    pub fn accepts(&self, run_id: Option<&str>) -> bool {
        match &self.run_id {
            Some(expected) => run_id == Some(expected.as_str()),
            None => true,
        }
    }

    /// Sample ids in manifest order, each once.
    pub fn sample_ids(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for unit in &self.units {
            if !seen.contains(&unit.sample_id.as_str()) {
                seen.push(unit.sample_id.as_str());
            }
        }
        seen
    }

    pub fn write(&self, path: &Path) -> Result<(), AggregateError> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomically(path, json.as_bytes()).map_err(|source| AggregateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(
            path = %path.display(),
            run_id = self.run_id.as_deref().unwrap_or_default(),
            units = self.units.len(),
            "wrote run manifest"
        );
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self, AggregateError> {
        let text = std::fs::read_to_string(path).map_err(|source| AggregateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest: Self = serde_json::from_str(&text)?;
        if ![MANIFEST_FORMAT_VERSION, LEGACY_FORMAT_VERSION].contains(&manifest.format_version) {
            return Err(AggregateError::Manifest(format!(
                "unsupported manifest format version {}",
                manifest.format_version
            )));
        }
        let mut keys = manifest.units.clone();
        keys.sort();
        if let Some(pair) = keys.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(AggregateError::Manifest(format!("unit {} listed twice", pair[0])));
        }
        Ok(manifest)
    }
}

/// Waits until every manifest unit has a call file from the current run.
///
/// Call files are renamed into place, so their presence means the unit
/// finished. A call file stamped with another run id is stale and still
/// counts as missing.
#[derive(Debug, Clone)]
pub struct CompletionBarrier {
    timeout: Duration,
    poll_interval: Duration,
}

impl CompletionBarrier {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            poll_interval: Duration::from_millis(500),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Units whose call file for this run is not present yet.
    pub fn missing(&self, root: &Path, manifest: &RunManifest) -> Vec<UnitKey> {
        manifest
            .units
            .iter()
            .filter(|unit| {
                let path = UnitPaths::new(root, &unit.sample_id, unit.region).call_file();
                if !path.is_file() {
                    return true;
                }
                let run_id = read_call_run_id(&path);
                if manifest.accepts(run_id.as_deref()) {
                    return false;
                }
                let found = run_id.as_deref().unwrap_or("none");
                debug!(unit = %unit, found, "stale call file");
                true
            })
            .cloned()
            .collect()
    }

    /// Block until all units are present or the timeout elapses.
    pub fn wait(&self, root: &Path, manifest: &RunManifest) -> Result<(), AggregateError> {
        let started = Instant::now();
        loop {
            let missing = self.missing(root, manifest);
            if missing.is_empty() {
                info!(units = manifest.units.len(), "all units complete");
                return Ok(());
            }
            if started.elapsed() >= self.timeout {
                warn!(missing = missing.len(), "completion barrier timed out");
                return Err(AggregateError::IncompleteRun { missing });
            }
            debug!(missing = missing.len(), "waiting for units");
            thread::sleep(self.poll_interval);
        }
    }
}

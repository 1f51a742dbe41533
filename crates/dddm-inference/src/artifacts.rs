//! Persisted run artifacts.
//!
//! A run directory holds:
//!
//! ```text
//! <base>/<name>_<i | hash>/
//!   config.json       key → primitive value
//!   summary.json      PosteriorSummary (with config_sha256)
//!   samples.json      posterior samples
//!   weights.json      nested sampling only
//!   full_chain.json   ensemble MCMC only, [step][walker][dim]
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use dddm_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::sampler::SamplerOutput;
use crate::summary::PosteriorSummary;

/// Value stored in a config record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
    /// String.
    Str(String),
    /// Sequence.
    List(Vec<ConfigValue>),
    /// Mapping.
    Map(BTreeMap<String, ConfigValue>),
    /// Anything else, kept as its text representation.
    Opaque(String),
}

impl ConfigValue {
    /// Wrap any value by its `Debug` text.
    pub fn opaque(value: &impl fmt::Debug) -> Self {
        ConfigValue::Opaque(format!("{:?}", value))
    }

    /// Convert a JSON value; `null` becomes opaque.
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => ConfigValue::Opaque("null".to_string()),
            Value::Bool(b) => ConfigValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ConfigValue::Int(i),
                None => ConfigValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => ConfigValue::Str(s.clone()),
            Value::Array(xs) => ConfigValue::List(xs.iter().map(ConfigValue::from_json).collect()),
            Value::Object(m) => ConfigValue::Map(m.iter().map(|(k, v)| (k.clone(), ConfigValue::from_json(v))).collect()),
        }
    }

    /// Only JSON-representable primitives: non-finite floats and opaque
    /// values become strings, recursively.
    pub fn to_savable(&self) -> ConfigValue {
        match self {
            ConfigValue::Float(x) if !x.is_finite() => ConfigValue::Str(x.to_string()),
            ConfigValue::Opaque(s) => ConfigValue::Str(s.clone()),
            ConfigValue::List(xs) => ConfigValue::List(xs.iter().map(ConfigValue::to_savable).collect()),
            ConfigValue::Map(m) => ConfigValue::Map(m.iter().map(|(k, v)| (k.clone(), v.to_savable())).collect()),
            other => other.clone(),
        }
    }
}

/// Key → value record describing a run.
pub type ConfigRecord = BTreeMap<String, ConfigValue>;

/// Flatten a serializable struct into a [`ConfigRecord`].
pub fn config_record<T: Serialize>(value: &T) -> Result<ConfigRecord> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(m) => Ok(m.iter().map(|(k, v)| (k.clone(), ConfigValue::from_json(v))).collect()),
        other => Err(Error::Validation(format!("config must serialize to a mapping, got {}", other))),
    }
}

/// A run directory read back from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedRun {
    /// Directory.
    pub dir: PathBuf,
    /// Config record.
    pub config: ConfigRecord,
    /// Summary statistics.
    pub summary: PosteriorSummary,
    /// Posterior samples.
    pub samples: Vec<Vec<f64>>,
    /// Sample weights (nested sampling).
    pub weights: Option<Vec<f64>>,
    /// Full chain (ensemble MCMC).
    pub full_chain: Option<Vec<Vec<Vec<f64>>>>,
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    let out = h.finalize();
    let mut s = String::with_capacity(64);
    for b in out {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    Ok(serde_json::from_slice(&std::fs::read(path)?)?)
}

fn read_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if path.is_file() { read_json(path).map(Some) } else { Ok(None) }
}

/// Run directories under a base location.
#[derive(Debug, Clone)]
pub struct ResultStore {
    base: PathBuf,
}

impl ResultStore {
    /// Store rooted at `base` (created on first save).
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Base location.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Create a fresh run directory.
    ///
    /// With a `hash` the directory is `<name>_<hash>` (reused if present, so
    /// parallel runs pick distinct hashes). Otherwise the first free
    /// `<name>_<i>` is claimed with an exclusive `create_dir`.
    pub fn open_save_dir(&self, name: &str, hash: Option<&str>) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.base)?;
        if let Some(hash) = hash {
            let dir = self.base.join(format!("{}_{}", name, hash));
            std::fs::create_dir_all(&dir)?;
            return Ok(dir);
        }
        let mut i = 0usize;
        loop {
            let dir = self.base.join(format!("{}_{}", name, i));
            match std::fs::create_dir(&dir) {
                Ok(()) => return Ok(dir),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => i += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Write config, summary, samples and weights or chain into `dir`.
    ///
    /// The summary written (and returned) carries the SHA-256 of the saved
    /// `config.json`.
    pub fn save(
        &self,
        dir: &Path,
        config: &ConfigRecord,
        summary: &PosteriorSummary,
        output: &SamplerOutput,
    ) -> Result<SavedRun> {
        if !dir.is_dir() {
            return Err(Error::NotFound(dir.to_path_buf()));
        }
        let config: ConfigRecord = config.iter().map(|(k, v)| (k.clone(), v.to_savable())).collect();
        let config_bytes = serde_json::to_vec_pretty(&config)?;
        std::fs::write(dir.join("config.json"), &config_bytes)?;

        let mut summary = summary.clone();
        summary.config_sha256 = Some(sha256_hex(&config_bytes));
        write_json(&dir.join("summary.json"), &summary)?;

        let (samples, weights, full_chain) = match output {
            SamplerOutput::Nested(out) => (out.samples.clone(), Some(out.weights.clone()), None),
            SamplerOutput::Ensemble(out) => (out.flat_samples(), None, Some(out.chain.clone())),
        };
        write_json(&dir.join("samples.json"), &samples)?;
        if let Some(w) = &weights {
            write_json(&dir.join("weights.json"), w)?;
        }
        if let Some(c) = &full_chain {
            write_json(&dir.join("full_chain.json"), c)?;
        }
        log::info!("saved {} run in {}", summary.sampler, dir.display());

        Ok(SavedRun { dir: dir.to_path_buf(), config, summary, samples, weights, full_chain })
    }

    /// Read a run directory.
    pub fn load_run(dir: &Path) -> Result<SavedRun> {
        if !dir.is_dir() {
            return Err(Error::NotFound(dir.to_path_buf()));
        }
        log::debug!("loading run from {}", dir.display());
        Ok(SavedRun {
            dir: dir.to_path_buf(),
            config: read_json(&dir.join("config.json"))?,
            summary: read_json(&dir.join("summary.json"))?,
            samples: read_json(&dir.join("samples.json"))?,
            weights: read_optional(&dir.join("weights.json"))?,
            full_chain: read_optional(&dir.join("full_chain.json"))?,
        })
    }

    /// Highest-numbered `<name>_<i>` directory.
    pub fn latest_run(&self, name: &str) -> Result<PathBuf> {
        let missing = || Error::NotFound(self.base.join(format!("{}_*", name)));
        if !self.base.is_dir() {
            return Err(missing());
        }
        let prefix = format!("{}_", name);
        let mut best: Option<(usize, PathBuf)> = None;
        for entry in std::fs::read_dir(&self.base)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(idx) = file_name
                .to_str()
                .and_then(|s| s.strip_prefix(&prefix))
                .and_then(|s| s.parse::<usize>().ok())
            else {
                continue;
            };
            if entry.path().is_dir() && best.as_ref().is_none_or(|(b, _)| idx > *b) {
                best = Some((idx, entry.path()));
            }
        }
        best.map(|(_, p)| p).ok_or_else(missing)
    }
}

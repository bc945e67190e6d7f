//! Durable storage for verified artifacts.
//!
//! Each slot holds at most one verified artifact: `<dir>/<slot>.py` plus a
//! `<slot>.meta.json` sidecar carrying its digest and revision. Promotion
//! replaces both files atomically, so a reader sees the previous artifact or
//! the new one. Named slots let concurrent scenarios keep separate artifacts.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, instrument};

use crate::io::config::validate_slot;
use crate::io::fs_util::write_atomic;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedMeta {
    pub slot: String,
    pub scenario_label: String,
    /// Attempt on which the artifact passed.
    pub attempt: u32,
    /// Increments on every promotion into this slot.
    pub revision: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedArtifact {
    pub code: String,
    pub meta: VerifiedMeta,
    pub path: PathBuf,
}

/// Where promotion came from.
#[derive(Debug, Clone, Copy)]
pub struct Provenance<'a> {
    pub scenario_label: &'a str,
    pub attempt: u32,
}

pub trait VerifiedStore {
    /// Current artifact in `slot`, if one was ever promoted.
    fn load(&self, slot: &str) -> Result<Option<VerifiedArtifact>>;

    /// Replace the artifact in `slot` with `code`.
    fn promote(&self, slot: &str, code: &str, provenance: Provenance<'_>) -> Result<VerifiedMeta>;
}

#[derive(Debug, Clone)]
pub struct FsVerifiedStore {
    dir: PathBuf,
}

impl FsVerifiedStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn code_path(&self, slot: &str) -> PathBuf {
        self.dir.join(format!("{slot}.py"))
    }

    pub fn meta_path(&self, slot: &str) -> PathBuf {
        self.dir.join(format!("{slot}.meta.json"))
    }

    fn read_meta(&self, slot: &str) -> Result<Option<VerifiedMeta>> {
        let path = self.meta_path(slot);
        if !path.exists() {
            return Ok(None);
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        let meta = serde_json::from_str(&contents)
            .with_context(|| format!("parse {}", path.display()))?;
        Ok(Some(meta))
    }
}

impl VerifiedStore for FsVerifiedStore {
    #[instrument(skip_all, fields(slot))]
    fn load(&self, slot: &str) -> Result<Option<VerifiedArtifact>> {
        validate_slot(slot)?;
        let Some(meta) = self.read_meta(slot)? else {
            return Ok(None);
        };
        let path = self.code_path(slot);
        let code = fs::read_to_string(&path)
            .with_context(|| format!("read verified artifact {}", path.display()))?;
        let digest = sha256_hex(&code);
        if digest != meta.sha256 {
            return Err(anyhow!(
                "verified artifact {} does not match its recorded digest",
                path.display()
            ));
        }
        Ok(Some(VerifiedArtifact { code, meta, path }))
    }

    #[instrument(skip_all, fields(slot, scenario = provenance.scenario_label, attempt = provenance.attempt))]
    fn promote(&self, slot: &str, code: &str, provenance: Provenance<'_>) -> Result<VerifiedMeta> {
        validate_slot(slot)?;
        let revision = self.read_meta(slot)?.map_or(1, |meta| meta.revision + 1);
        let meta = VerifiedMeta {
            slot: slot.to_string(),
            scenario_label: provenance.scenario_label.to_string(),
            attempt: provenance.attempt,
            revision,
            sha256: sha256_hex(code),
        };
        let mut meta_json = serde_json::to_string_pretty(&meta).context("serialize verified meta")?;
        meta_json.push('\n');

        // Code before meta; an interrupted promotion shows up as a digest
        // mismatch on load.
        write_atomic(&self.code_path(slot), code.as_bytes())?;
        write_atomic(&self.meta_path(slot), meta_json.as_bytes())?;
        info!(revision, sha256 = %meta.sha256, "verified artifact promoted");
        Ok(meta)
    }
}

pub fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

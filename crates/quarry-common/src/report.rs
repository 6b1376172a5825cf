use std::collections::BTreeSet;
use std::fmt;

/// Kinds of decode problems that are absorbed locally and only surfaced at the end of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnomalyKind {
    MalformedPackedArray,
    CorruptPalette,
    UndecodableChunk,
    MissingChunkData,
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalyKind::MalformedPackedArray => write!(f, "malformed packed array"),
            AnomalyKind::CorruptPalette => write!(f, "palette index out of range"),
            AnomalyKind::UndecodableChunk => write!(f, "undecodable chunk"),
            AnomalyKind::MissingChunkData => write!(f, "missing chunk data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    /// Absolute chunk coordinates, when known
    pub chunk: Option<(i32, i32)>,
    pub detail: String,
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.chunk {
            Some((x, z)) => write!(f, "{} in chunk ({}, {}): {}", self.kind, x, z, self.detail),
            None => write!(f, "{}: {}", self.kind, self.detail),
        }
    }
}

/// Diagnostics collected over one render pass. Unknown block identifiers are kept once each;
/// anomalies are de-duplicated so a bad section reports one entry, not one per pixel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderReport {
    missing_blocks: BTreeSet<String>,
    anomalies: BTreeSet<Anomaly>,
    /// Anomalies reported by out-of-process workers, which only send a count
    remote_anomalies: usize,
}

impl RenderReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an identifier with no known colour. Returns true the first time it is seen.
    pub fn record_missing_block(&mut self, identifier: &str) -> bool {
        if self.missing_blocks.contains(identifier) {
            return false;
        }
        self.missing_blocks.insert(identifier.to_owned())
    }

    pub fn record_anomaly(&mut self, kind: AnomalyKind, chunk: Option<(i32, i32)>, detail: String) {
        self.anomalies.insert(Anomaly {
            kind,
            chunk,
            detail,
        });
    }

    pub fn add_remote_anomalies(&mut self, count: usize) {
        self.remote_anomalies += count;
    }

    pub fn missing_blocks(&self) -> &BTreeSet<String> {
        &self.missing_blocks
    }

    pub fn anomalies(&self) -> impl Iterator<Item = &Anomaly> {
        self.anomalies.iter()
    }

    pub fn anomaly_count(&self) -> usize {
        self.anomalies.len() + self.remote_anomalies
    }

    pub fn is_clean(&self) -> bool {
        self.missing_blocks.is_empty() && self.anomaly_count() == 0
    }

    /// Folds another pass into this one
    pub fn merge(&mut self, other: RenderReport) {
        self.missing_blocks.extend(other.missing_blocks);
        self.anomalies.extend(other.anomalies);
        self.remote_anomalies += other.remote_anomalies;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_block_recorded_once() {
        let mut report = RenderReport::new();
        assert!(report.record_missing_block("minecraft:mystery"));
        assert!(!report.record_missing_block("minecraft:mystery"));
        assert_eq!(report.missing_blocks().len(), 1);
    }

    #[test]
    fn test_merge_is_union() {
        let mut a = RenderReport::new();
        a.record_missing_block("a");
        a.record_missing_block("b");
        let mut b = RenderReport::new();
        b.record_missing_block("b");
        b.record_missing_block("c");
        b.add_remote_anomalies(2);
        a.merge(b);
        let blocks: Vec<_> = a.missing_blocks().iter().cloned().collect();
        assert_eq!(blocks, vec!["a", "b", "c"]);
        assert_eq!(a.anomaly_count(), 2);
    }

    #[test]
    fn test_anomalies_deduplicated() {
        let mut report = RenderReport::new();
        for _ in 0..10 {
            report.record_anomaly(AnomalyKind::CorruptPalette, Some((1, 2)), "index 9".into());
        }
        assert_eq!(report.anomaly_count(), 1);
        assert!(!report.is_clean());
    }
}

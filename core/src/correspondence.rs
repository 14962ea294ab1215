use crate::{Error, Result};

/// Discrete point-to-point correspondence between two meshes.
///
/// Holds two equal-length index sequences: vertex `source[t]` of mesh X is
/// matched to vertex `target[t]` of mesh Y. Refinement produces fresh
/// instances; a published correspondence is never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correspondence {
    source: Vec<usize>,
    target: Vec<usize>,
}

impl Correspondence {
    /// Builds a correspondence from two index sequences of equal length.
    pub fn new(source: Vec<usize>, target: Vec<usize>) -> Result<Self> {
        if source.len() != target.len() {
            return Err(Error::Precondition(format!(
                "Correspondence index sequences differ in length: {} vs {}",
                source.len(),
                target.len()
            )));
        }
        Ok(Self { source, target })
    }

    /// Builds a correspondence from matched `(source, target)` pairs.
    pub fn from_pairs(pairs: &[(usize, usize)]) -> Self {
        Self {
            source: pairs.iter().map(|&(s, _)| s).collect(),
            target: pairs.iter().map(|&(_, t)| t).collect(),
        }
    }

    /// Identity correspondence over the first `n` vertices of both meshes.
    pub fn identity(n: usize) -> Self {
        let idx: Vec<usize> = (0..n).collect();
        Self {
            source: idx.clone(),
            target: idx,
        }
    }

    /// Number of matched pairs.
    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Indices into mesh X, one per matched pair.
    pub fn source(&self) -> &[usize] {
        &self.source
    }

    /// Indices into mesh Y, one per matched pair.
    pub fn target(&self) -> &[usize] {
        &self.target
    }

    /// Iterates over matched `(source, target)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.source.iter().copied().zip(self.target.iter().copied())
    }

    /// Validates every index against the vertex counts of the two meshes.
    pub fn check_bounds(&self, source_count: usize, target_count: usize) -> Result<()> {
        for (s, t) in self.pairs() {
            if s >= source_count {
                return Err(Error::Precondition(format!(
                    "Correspondence source index {} out of range for {} vertices",
                    s, source_count
                )));
            }
            if t >= target_count {
                return Err(Error::Precondition(format!(
                    "Correspondence target index {} out of range for {} vertices",
                    t, target_count
                )));
            }
        }
        Ok(())
    }
}

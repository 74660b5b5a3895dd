//! In-memory flat inner-product index.
//!
//! Vectors are normalised on insert and on query, so inner product equals
//! cosine similarity. Search is brute force over every stored vector, which
//! is the right trade-off for a curated corpus of a few hundred records.

use anyhow::{bail, Result};

use super::VectorIndex;
use crate::embedding::{dot, normalize};

/// Brute-force index; position `i` is the `i`-th vector ever added.
#[derive(Debug, Clone, Default)]
pub struct FlatIndex {
    dims: Option<usize>,
    vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorIndex for FlatIndex {
    fn add(&mut self, vectors: Vec<Vec<f32>>) -> Result<()> {
        for mut v in vectors {
            if v.is_empty() {
                bail!("cannot index an empty vector");
            }
            match self.dims {
                Some(d) if d != v.len() => {
                    bail!("dimension mismatch: index has {}, got {}", d, v.len())
                }
                None => self.dims = Some(v.len()),
                _ => {}
            }
            normalize(&mut v);
            self.vectors.push(v);
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if self.vectors.is_empty() || k == 0 || Some(query.len()) != self.dims {
            return Vec::new();
        }
        let mut q = query.to_vec();
        normalize(&mut q);

        let mut hits: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(pos, v)| (pos, dot(&q, v)))
            .collect();
        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        hits.truncate(k);
        hits
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn dims(&self) -> Option<usize> {
        self.dims
    }
}

//! Exact brute-force vector space.

use super::{Dtype, Metric, ScoredPoint, SpaceKind, Vector, VectorIndex};
use crate::codec::BitVector;
use crate::embedding::cosine_similarity;
use crate::error::SearchError;
use crate::identity::owning_document_of;
use crate::storage::DocumentStore;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, instrument, warn};

/// Distance assigned when either cosine operand has zero magnitude.
const MAX_COSINE_DISTANCE: f32 = 2.0;

struct Point {
    id: String,
    vector: Vector,
}

/// Points in insertion order, plus each id's position.
#[derive(Default)]
struct SpaceState {
    points: Vec<Point>,
    positions: HashMap<String, usize>,
}

impl SpaceState {
    fn reindex(&mut self) {
        self.positions = self
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.clone(), i))
            .collect();
    }
}

/// Exact nearest-neighbour space over a flat vector buffer.
///
/// Every search scans every point. Ties keep insertion order. Each id is
/// registered at most once.
pub struct FlatVectorSpace {
    kind: SpaceKind,
    dimension: usize,
    state: RwLock<SpaceState>,
}

impl FlatVectorSpace {
    /// Creates an empty space.
    pub fn new(kind: SpaceKind, dimension: usize) -> Self {
        if kind.dtype() == Dtype::BitPacked && dimension % 8 != 0 {
            warn!(
                "{} configured with {} dimensions; packed vectors carry {} padding bits",
                kind,
                dimension,
                8 - dimension % 8
            );
        }
        Self {
            kind,
            dimension,
            state: RwLock::new(SpaceState::default()),
        }
    }

    /// Builds a space from every persisted document.
    ///
    /// Documents without the relevant section are skipped. A document or
    /// vector that fails to load or decode is logged and skipped; it never
    /// aborts the build.
    #[instrument(skip_all, fields(space = kind.name()))]
    pub async fn build(
        kind: SpaceKind,
        dimension: usize,
        store: &dyn DocumentStore,
    ) -> Result<Self, SearchError> {
        let space = Self::new(kind, dimension);
        let ids = store
            .document_ids()
            .await
            .map_err(|e| SearchError::IndexError(e.to_string()))?;

        let mut skipped = 0usize;
        for doc_id in &ids {
            let doc = match store.get_document(doc_id).await {
                Ok(Some(doc)) => doc,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping document {}: {}", doc_id, e);
                    skipped += 1;
                    continue;
                }
            };

            let encoded: Vec<(String, &str)> = match kind {
                SpaceKind::Text => doc
                    .fragments()
                    .iter()
                    .map(|(id, f)| (id.to_string(), f.embedding.as_str()))
                    .collect(),
                SpaceKind::Metadata => doc
                    .metadata_record()
                    .and_then(|r| r.embedding())
                    .map(|e| vec![(doc.id.clone(), e)])
                    .unwrap_or_default(),
                SpaceKind::Image => doc
                    .images
                    .iter()
                    .map(|(id, img)| (id.to_string(), img.embedding.as_str()))
                    .collect(),
            };

            for (point_id, text) in encoded {
                let added = Vector::decode(kind, dimension, text)
                    .and_then(|vector| space.add_point(point_id.clone(), vector));
                if let Err(e) = added {
                    warn!("Skipping point {} in {}: {}", point_id, kind, e);
                    skipped += 1;
                }
            }
        }

        info!(
            "Built {} with {} points from {} documents ({} skipped)",
            kind,
            space.len(),
            ids.len(),
            skipped
        );
        Ok(space)
    }

    // Every write leaves the buffer well-formed, so a poisoned lock is safe to reuse.
    fn read(&self) -> RwLockReadGuard<'_, SpaceState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SpaceState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, vector: &Vector) -> Result<(), SearchError> {
        if vector.dtype() != self.kind.dtype() {
            return Err(SearchError::DtypeMismatch {
                space: self.kind.name().to_string(),
                expected: self.kind.dtype().name(),
            });
        }
        if vector.dimension() != self.dimension {
            return Err(SearchError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.dimension(),
            });
        }
        Ok(())
    }

    fn distance(&self, query: &Vector, point: &Vector) -> f32 {
        match (self.kind.metric(), query, point) {
            (Metric::Manhattan, Vector::Bits(q), Vector::Bits(p)) => manhattan(q, p),
            (Metric::Cosine, Vector::Float32(q), Vector::Float32(p)) => cosine_distance(q, p),
            // add_point and search both check the dtype, so mixed pairs never occur
            _ => f32::INFINITY,
        }
    }
}

fn manhattan(a: &BitVector, b: &BitVector) -> f32 {
    a.hamming(b) as f32
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let is_zero = |v: &[f32]| v.iter().all(|&x| x == 0.0);
    if is_zero(a) || is_zero(b) {
        return MAX_COSINE_DISTANCE;
    }
    1.0 - cosine_similarity(a, b)
}

impl VectorIndex for FlatVectorSpace {
    fn kind(&self) -> SpaceKind {
        self.kind
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.read().points.len()
    }

    #[instrument(skip_all, fields(space = self.kind.name(), id = %id))]
    fn add_point(&self, id: String, vector: Vector) -> Result<(), SearchError> {
        self.check(&vector)?;
        let mut state = self.write();
        match state.positions.get(&id).copied() {
            Some(i) => {
                debug!("Replacing point {}", id);
                state.points[i].vector = vector;
            }
            None => {
                let i = state.points.len();
                state.positions.insert(id.clone(), i);
                state.points.push(Point { id, vector });
            }
        }
        Ok(())
    }

    #[instrument(skip_all, fields(space = self.kind.name(), document_id = %document_id))]
    fn remove_document(&self, document_id: &str) -> usize {
        let mut state = self.write();
        let before = state.points.len();
        state
            .points
            .retain(|p| owning_document_of(&p.id) != document_id);
        let removed = before - state.points.len();
        if removed > 0 {
            state.reindex();
            debug!("Removed {} points of {}", removed, document_id);
        }
        removed
    }

    #[instrument(skip_all, fields(space = self.kind.name(), top_k = top_k))]
    fn search(&self, query: &Vector, top_k: usize) -> Result<Vec<ScoredPoint>, SearchError> {
        self.check(query)?;
        let state = self.read();

        let mut scored: Vec<(usize, f32)> = state
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| (i, self.distance(query, &p.vector)))
            .collect();
        // sort_by is stable: equal distances keep insertion order
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(i, score)| ScoredPoint {
                id: state.points[i].id.clone(),
                score,
            })
            .collect())
    }
}

//! Vector representation and the random-access vector-storage interface
//! the core consumes from a collaborator.

use ndarray::Array1;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{VortexError, VortexResult};
use crate::types::NodeId;

/// A single vector embedding. Wraps `ndarray::Array1<f32>` for efficient
/// numerical operations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Embedding(pub Array1<f32>);

impl std::ops::Deref for Embedding {
    type Target = Array1<f32>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::ops::DerefMut for Embedding {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(vec: Vec<f32>) -> Self {
        Embedding(Array1::from(vec))
    }
}

impl From<Embedding> for Vec<f32> {
    fn from(embedding: Embedding) -> Self {
        embedding.0.to_vec()
    }
}

/// Random-access vector storage, consumed (never implemented as a product
/// backend) by this crate: `size`/`dimension` describe the collection,
/// `get_vector` returns a node's vector, `get_vector_into` is an optional
/// zero-allocation variant a disk-backed or mmap-backed implementation can
/// override, and `is_value_shared` tells a caller whether the returned
/// buffer is safe to hold past the next call.
///
/// This crate's persistence and on-disk layout are explicitly out of
/// scope; the only implementation it ships, [`InMemoryVectorValues`], is
/// a test double used by this crate's own tests and benchmarks.
pub trait RandomAccessVectorValues: Send + Sync {
    fn size(&self) -> usize;

    fn dimension(&self) -> usize;

    fn get_vector(&self, id: NodeId) -> Option<Embedding>;

    /// Writes the vector for `id` into `buf`, avoiding an allocation.
    /// Implementations that can't support this (e.g. a codec that must
    /// decompress into a fresh buffer anyway) can rely on the default,
    /// which reports the operation unsupported.
    fn get_vector_into(&self, id: NodeId, buf: &mut [f32]) -> VortexResult<()> {
        let _ = (id, buf);
        Err(VortexError::UnsupportedOperation("get_vector_into".to_string()))
    }

    /// True if `get_vector` may return a buffer that is reused (and thus
    /// invalidated) by a subsequent call to this trait's methods.
    fn is_value_shared(&self) -> bool;

    fn copy(&self) -> Box<dyn RandomAccessVectorValues>;
}

/// A plain `Vec<Embedding>`-backed implementation of
/// [`RandomAccessVectorValues`], used by this crate's tests and
/// benchmarks in place of a real (disk-backed) collaborator.
#[derive(Debug, Default)]
pub struct InMemoryVectorValues {
    dimension: usize,
    vectors: RwLock<Vec<Option<Embedding>>>,
}

impl InMemoryVectorValues {
    pub fn new(dimension: usize) -> Self {
        InMemoryVectorValues { dimension, vectors: RwLock::new(Vec::new()) }
    }

    /// Stores `vector` at `id`, growing the backing vector as needed.
    /// Returns `DimensionMismatch` if `vector`'s length doesn't match.
    pub fn put(&self, id: NodeId, vector: Embedding) -> VortexResult<()> {
        if vector.len() != self.dimension {
            return Err(VortexError::DimensionMismatch { expected: self.dimension, actual: vector.len() });
        }
        let idx = id.as_usize();
        let mut guard = self.vectors.write();
        if idx >= guard.len() {
            guard.resize_with(idx + 1, || None);
        }
        guard[idx] = Some(vector);
        Ok(())
    }
}

impl RandomAccessVectorValues for InMemoryVectorValues {
    fn size(&self) -> usize {
        self.vectors.read().iter().filter(|v| v.is_some()).count()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn get_vector(&self, id: NodeId) -> Option<Embedding> {
        self.vectors.read().get(id.as_usize()).and_then(|v| v.clone())
    }

    fn is_value_shared(&self) -> bool {
        false
    }

    fn copy(&self) -> Box<dyn RandomAccessVectorValues> {
        let guard = self.vectors.read();
        Box::new(InMemoryVectorValues { dimension: self.dimension, vectors: RwLock::new(guard.clone()) })
    }
}

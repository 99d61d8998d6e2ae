use anyhow::Result;
use async_trait::async_trait;
use shared::domain::{ItemId, TodoItem};
use thiserror::Error;
use tracing::debug;

/// Seq given to the first item of an empty list.
pub const INITIAL_SEQ: f64 = 1.0;

/// Distance kept from a neighbor when an item is moved past a list edge.
const EDGE_STEP: f64 = 1.0;

/// Directional filter over `seq`. Results are always returned closest to the
/// bound first: `AtMost` in descending seq order, `AtLeast` ascending.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeqBound {
    AtMost(f64),
    AtLeast(f64),
}

#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn find_by_id(&self, id: &ItemId) -> Result<Option<TodoItem>>;
    async fn find_bounded_by_seq(
        &self,
        bound: SeqBound,
        exclude: &ItemId,
        limit: u32,
    ) -> Result<Vec<TodoItem>>;
    async fn find_max_seq(&self) -> Result<Option<TodoItem>>;
    async fn update_seq(&self, id: &ItemId, seq: f64) -> Result<()>;
}

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("item {0} not found")]
    NotFound(ItemId),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("no seq value left between {low} and {high}")]
    PrecisionExhausted { low: f64, high: f64 },
    #[error("item store unavailable: {0:#}")]
    Store(anyhow::Error),
}

impl From<anyhow::Error> for SequenceError {
    fn from(value: anyhow::Error) -> Self {
        Self::Store(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReorderOutcome {
    pub item: TodoItem,
    pub moved: bool,
}

impl ReorderOutcome {
    fn unchanged(item: TodoItem) -> Self {
        Self { item, moved: false }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Earlier,
    Later,
}

impl Direction {
    fn of(source: &TodoItem, destination: &TodoItem) -> Self {
        if source.seq >= destination.seq {
            Self::Earlier
        } else {
            Self::Later
        }
    }

    fn bound(self, seq: f64) -> SeqBound {
        match self {
            Self::Earlier => SeqBound::AtMost(seq),
            Self::Later => SeqBound::AtLeast(seq),
        }
    }

    fn past_edge(self, seq: f64) -> f64 {
        match self {
            Self::Earlier => seq - EDGE_STEP,
            Self::Later => seq + EDGE_STEP,
        }
    }
}

/// Computes and assigns the `seq` ordering key of to-do items.
///
/// Reads and the single write of a reorder are separate store round-trips, so
/// two concurrent moves touching the same neighbors can leave equal or stale
/// keys behind. A later move of either item settles the order again.
#[derive(Debug, Clone)]
pub struct Sequencer<S: ItemStore> {
    store: S,
}

impl<S: ItemStore> Sequencer<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Seq for a new item: one past the current maximum, or [`INITIAL_SEQ`].
    pub async fn assign_initial_seq(&self) -> Result<f64, SequenceError> {
        let max = self.store.find_max_seq().await?;
        Ok(max.map_or(INITIAL_SEQ, |item| item.seq + 1.0))
    }

    /// Moves `source_id` just past `destination_id`, on the side it is heading
    /// towards. Only the source item's seq is ever written, and repeating the
    /// call swaps the pair back.
    pub async fn reorder(
        &self,
        source_id: &ItemId,
        destination_id: &ItemId,
    ) -> Result<ReorderOutcome, SequenceError> {
        if source_id.as_str().trim().is_empty() || destination_id.as_str().trim().is_empty() {
            return Err(SequenceError::InvalidArgument(
                "source and destination ids must not be empty".into(),
            ));
        }

        let source = self.require(source_id).await?;
        if source_id == destination_id {
            return Ok(ReorderOutcome::unchanged(source));
        }
        let destination = self.require(destination_id).await?;

        let direction = Direction::of(&source, &destination);

        let neighbors = self
            .store
            .find_bounded_by_seq(direction.bound(destination.seq), &source.id, 2)
            .await?;

        let new_seq = match neighbors.as_slice() {
            [] => {
                debug!(source = %source.id, "no neighbors on travel side");
                return Ok(ReorderOutcome::unchanged(source));
            }
            [edge] => direction.past_edge(edge.seq),
            [closest, next, ..] => midpoint(closest.seq, next.seq)?,
        };

        debug!(
            source = %source.id,
            destination = %destination.id,
            ?direction,
            old_seq = source.seq,
            new_seq,
            "reordering item"
        );
        self.store.update_seq(&source.id, new_seq).await?;

        Ok(ReorderOutcome {
            item: TodoItem {
                seq: new_seq,
                ..source
            },
            moved: true,
        })
    }

    async fn require(&self, id: &ItemId) -> Result<TodoItem, SequenceError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| SequenceError::NotFound(id.clone()))
    }
}

fn midpoint(a: f64, b: f64) -> Result<f64, SequenceError> {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    let mid = low + (high - low) / 2.0;
    if mid > low && mid < high {
        Ok(mid)
    } else {
        Err(SequenceError::PrecisionExhausted { low, high })
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

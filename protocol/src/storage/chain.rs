//! In-memory chain management with validation.
//!
//! A [`Chain`] is never empty: it is born with a genesis block, and the
//! only other way to get one is [`Chain::from_blocks`], which validates
//! the whole sequence first. Blocks are only ever added through
//! [`Chain::append`], which checks the candidate against the tail before
//! committing it.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::block::Block;
use super::error::{IntegrityError, StorageResult};
use crate::certificate::Certificate;

/// Ordered, append-only sequence of validated blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Chain {
    blocks: Vec<Block>,
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

impl Chain {
    /// A fresh chain holding only the genesis block.
    pub fn new() -> Self {
        Self {
            blocks: vec![Block::genesis()],
        }
    }

    /// Adopt an existing block sequence (e.g. from a snapshot) after a
    /// full integrity scan.
    pub fn from_blocks(blocks: Vec<Block>) -> Result<Self, IntegrityError> {
        validate_blocks(&blocks)?;
        Ok(Self { blocks })
    }

    /// Issue a certificate: build a block on top of the tip, validate it
    /// against the tip, and commit it.
    ///
    /// On any error the chain is left exactly as it was.
    pub fn append(&mut self, certificate: Certificate) -> StorageResult<Block> {
        self.append_at(certificate, Utc::now())
    }

    /// [`Chain::append`] with an explicit block timestamp.
    pub fn append_at(
        &mut self,
        certificate: Certificate,
        created_at: DateTime<Utc>,
    ) -> StorageResult<Block> {
        certificate.validate()?;

        let tip = self.tip();
        let candidate = Block::next_at(tip, certificate, created_at);
        if let Err(e) = candidate.validate_successor_of(tip) {
            tracing::error!(index = candidate.index, error = %e, "candidate block rejected");
            return Err(e.into());
        }

        tracing::debug!(index = candidate.index, hash = %candidate.hash, "block appended");
        self.blocks.push(candidate.clone());
        Ok(candidate)
    }

    /// Full integrity scan from genesis forward. Returns the first failure.
    pub fn validate(&self) -> Result<(), IntegrityError> {
        validate_blocks(&self.blocks)
    }

    /// `true` if [`Chain::validate`] passes.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Offset of the first invalid block, or `None` if the chain is valid.
    pub fn first_invalid_index(&self) -> Option<usize> {
        self.validate().err().map(|e| e.position())
    }

    /// The most recent block.
    pub fn tip(&self) -> &Block {
        // `blocks` always holds at least the genesis block.
        &self.blocks[self.blocks.len() - 1]
    }

    /// The genesis block.
    pub fn genesis(&self) -> &Block {
        &self.blocks[0]
    }

    /// Block at `index`, if any.
    pub fn get(&self, index: u64) -> Option<&Block> {
        usize::try_from(index).ok().and_then(|i| self.blocks.get(i))
    }

    /// Number of blocks, genesis included.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Index of the tip block.
    pub fn height(&self) -> u64 {
        self.tip().index
    }

    /// All blocks, genesis first.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Iterate over blocks, genesis first.
    pub fn iter(&self) -> std::slice::Iter<'_, Block> {
        self.blocks.iter()
    }

    /// Every issued block whose certificate belongs to `member_id`.
    /// The genesis block is never returned.
    pub fn certificates_for_member(&self, member_id: &str) -> Vec<&Block> {
        self.blocks
            .iter()
            .skip(1)
            .filter(|b| b.payload.member_id == member_id)
            .collect()
    }

    /// Give up ownership of the blocks.
    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }

    #[cfg(test)]
    pub(crate) fn blocks_mut(&mut self) -> &mut Vec<Block> {
        &mut self.blocks
    }
}

impl<'a> IntoIterator for &'a Chain {
    type Item = &'a Block;
    type IntoIter = std::slice::Iter<'a, Block>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}

/// Genesis shape check, then the pairwise rule over every consecutive pair.
fn validate_blocks(blocks: &[Block]) -> Result<(), IntegrityError> {
    let genesis = blocks.first().ok_or(IntegrityError::EmptyChain)?;
    genesis.validate_genesis()?;

    for (position, pair) in blocks.windows(2).enumerate() {
        pair[1]
            .validate_successor_of(&pair[0])
            .map_err(|e| e.at(position + 1))?;
    }
    Ok(())
}

//! Serializable document images.
//!
//! Snapshots are the persistence and rebuild format for a `DocStore`. Blocks
//! are listed in pre-order so a reader can rebuild parents before children.

use crate::model::block::{Block, BlockId, BlockModel, PropError};
use crate::model::props::PropMap;
use serde::{Deserialize, Serialize};

/// One block image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSnapshot {
    pub id: BlockId,
    pub flavour: String,
    pub parent: Option<BlockId>,
    pub children: Vec<BlockId>,
    pub props: PropMap,
}

impl BlockSnapshot {
    pub(crate) fn capture(block: &Block) -> Self {
        Self {
            id: block.id.clone(),
            flavour: block.flavour.clone(),
            parent: block.parent.clone(),
            children: block.children.clone(),
            props: block.model.props(),
        }
    }

    /// Rebuilds a block, keeping parent/children links from the image.
    pub(crate) fn restore(&self) -> Result<Block, PropError> {
        let mut model = BlockModel::for_flavour(&self.flavour);
        for (field, value) in &self.props {
            model.set(field, value.clone())?;
        }
        let mut block = Block::new(self.id.clone(), &self.flavour, model);
        block.parent = self.parent.clone();
        block.children = self.children.clone();
        Ok(block)
    }
}

/// Whole-document image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocSnapshot {
    pub doc_id: String,
    pub root: Option<BlockId>,
    pub blocks: Vec<BlockSnapshot>,
}

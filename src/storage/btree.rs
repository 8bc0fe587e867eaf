//! # Page Codec
//!
//! Every 4096-byte page holds exactly one B+ tree node, either a leaf or an
//! internal node. The two variants share a 6-byte common header (node type,
//! root flag, parent page number) and diverge in the rest of the layout:
//!
//! | **Property**       | **Internal node**             | **Leaf node**       |
//! |--------------------|-------------------------------|---------------------|
//! | Stores             | keys and child page numbers   | keys and row frames |
//! | Cell shape         | `(child: u32, key: u32)`      | `(key: u32, row)`   |
//! | Cell key meaning   | max key of the child subtree  | the row's id        |
//! | Extra header       | `num_keys`, `right_child`     | `num_cells`, `next_leaf` |
//!
//! The right child of an internal node is stored apart from the cell array
//! and covers all keys strictly greater than every cell key. Leaves are
//! chained in key order through `next_leaf`; `0` marks the rightmost leaf
//! (page 0 is always the root and never a chain target).
//!
//! All multi-byte integers are `u32` little-endian. Nodes reference each
//! other by page number only, never by pointer, so splits can reshuffle
//! pages without invalidating anything.

use super::row::ROW_SIZE;
use crate::errors::Error;

/// Page size of 4 kilobytes, matching the virtual memory page of most
/// architectures.
pub const PAGE_SIZE: usize = 4096;

/// Sentinel page number meaning "no such page".
pub const INVALID_PAGE_NUM: u32 = u32::MAX;

// Common node header layout.

const NODE_TYPE_SIZE: usize = std::mem::size_of::<u8>();
const NODE_TYPE_OFFSET: usize = 0;
const IS_ROOT_SIZE: usize = std::mem::size_of::<u8>();
const IS_ROOT_OFFSET: usize = NODE_TYPE_OFFSET + NODE_TYPE_SIZE;
const PARENT_POINTER_SIZE: usize = std::mem::size_of::<u32>();
const PARENT_POINTER_OFFSET: usize = IS_ROOT_OFFSET + IS_ROOT_SIZE;

/// Total size of the header shared by both node types.
pub const COMMON_NODE_HEADER_SIZE: usize = NODE_TYPE_SIZE + IS_ROOT_SIZE + PARENT_POINTER_SIZE;

// Leaf node header layout.

const LEAF_NODE_NUM_CELLS_SIZE: usize = std::mem::size_of::<u32>();
const LEAF_NODE_NUM_CELLS_OFFSET: usize = COMMON_NODE_HEADER_SIZE;
const LEAF_NODE_NEXT_LEAF_SIZE: usize = std::mem::size_of::<u32>();
const LEAF_NODE_NEXT_LEAF_OFFSET: usize = LEAF_NODE_NUM_CELLS_OFFSET + LEAF_NODE_NUM_CELLS_SIZE;

/// Total size of the leaf node header.
pub const LEAF_NODE_HEADER_SIZE: usize =
    COMMON_NODE_HEADER_SIZE + LEAF_NODE_NUM_CELLS_SIZE + LEAF_NODE_NEXT_LEAF_SIZE;

// Leaf node body layout.

const LEAF_NODE_KEY_SIZE: usize = std::mem::size_of::<u32>();
const LEAF_NODE_VALUE_SIZE: usize = ROW_SIZE;

/// Size of one leaf cell: a `u32` key followed by a serialized row.
pub const LEAF_NODE_CELL_SIZE: usize = LEAF_NODE_KEY_SIZE + LEAF_NODE_VALUE_SIZE;

/// Space available for cells after the leaf header.
pub const LEAF_NODE_SPACE_FOR_CELLS: usize = PAGE_SIZE - LEAF_NODE_HEADER_SIZE;

/// Maximum number of cells a leaf can hold before it must split.
pub const LEAF_NODE_MAX_CELLS: usize = LEAF_NODE_SPACE_FOR_CELLS / LEAF_NODE_CELL_SIZE;

/// Number of cells assigned to the right sibling when a leaf splits.
pub const LEAF_NODE_RIGHT_SPLIT_COUNT: usize = (LEAF_NODE_MAX_CELLS + 1) / 2;

/// Number of cells that stay in the left node when a leaf splits.
pub const LEAF_NODE_LEFT_SPLIT_COUNT: usize =
    LEAF_NODE_MAX_CELLS + 1 - LEAF_NODE_RIGHT_SPLIT_COUNT;

// Internal node header layout.

const INTERNAL_NODE_NUM_KEYS_SIZE: usize = std::mem::size_of::<u32>();
const INTERNAL_NODE_NUM_KEYS_OFFSET: usize = COMMON_NODE_HEADER_SIZE;
const INTERNAL_NODE_RIGHT_CHILD_SIZE: usize = std::mem::size_of::<u32>();
const INTERNAL_NODE_RIGHT_CHILD_OFFSET: usize =
    INTERNAL_NODE_NUM_KEYS_OFFSET + INTERNAL_NODE_NUM_KEYS_SIZE;

/// Total size of the internal node header.
pub const INTERNAL_NODE_HEADER_SIZE: usize =
    COMMON_NODE_HEADER_SIZE + INTERNAL_NODE_NUM_KEYS_SIZE + INTERNAL_NODE_RIGHT_CHILD_SIZE;

// Internal node body layout.

const INTERNAL_NODE_CHILD_SIZE: usize = std::mem::size_of::<u32>();
const INTERNAL_NODE_KEY_SIZE: usize = std::mem::size_of::<u32>();

/// Size of one internal cell: a child page number followed by that
/// subtree's maximum key.
pub const INTERNAL_NODE_CELL_SIZE: usize = INTERNAL_NODE_CHILD_SIZE + INTERNAL_NODE_KEY_SIZE;

/// Hard cap on internal node cells. Kept deliberately small so splits are
/// exercised after a handful of inserts.
pub const INTERNAL_NODE_MAX_CELLS: usize = 3;

/// The on-page node variant, read from the first header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Internal,
    Leaf,
}

/// A B+ tree node over an owned page buffer.
///
/// Accessors decode and encode fields at the fixed offsets above. Dynamic
/// cell indexing is bounds-checked and surfaces `Error::Storage` on
/// violation, which callers treat as fatal.
#[derive(Clone)]
pub struct Node {
    pub data: [u8; PAGE_SIZE],
}

impl Node {
    pub fn new() -> Self {
        Node {
            data: [0u8; PAGE_SIZE],
        }
    }

    fn read_u32(&self, offset: usize) -> u32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.data[offset..offset + 4]);
        u32::from_le_bytes(bytes)
    }

    fn write_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    // Common header.

    /// Decodes the node type byte: 0 is internal, 1 is leaf.
    pub fn node_type(&self) -> Result<NodeType, Error> {
        match self.data[NODE_TYPE_OFFSET] {
            0 => Ok(NodeType::Internal),
            1 => Ok(NodeType::Leaf),
            invalid => Err(err!(Storage, "Invalid node type byte: {}", invalid)),
        }
    }

    pub fn set_node_type(&mut self, node_type: NodeType) {
        self.data[NODE_TYPE_OFFSET] = match node_type {
            NodeType::Internal => 0,
            NodeType::Leaf => 1,
        };
    }

    pub fn is_root(&self) -> bool {
        self.data[IS_ROOT_OFFSET] == 1
    }

    pub fn set_root(&mut self, is_root: bool) {
        self.data[IS_ROOT_OFFSET] = is_root as u8;
    }

    pub fn parent(&self) -> u32 {
        self.read_u32(PARENT_POINTER_OFFSET)
    }

    pub fn set_parent(&mut self, parent: u32) {
        self.write_u32(PARENT_POINTER_OFFSET, parent);
    }

    // Leaf node accessors.

    pub fn leaf_num_cells(&self) -> u32 {
        self.read_u32(LEAF_NODE_NUM_CELLS_OFFSET)
    }

    pub fn set_leaf_num_cells(&mut self, num_cells: u32) {
        self.write_u32(LEAF_NODE_NUM_CELLS_OFFSET, num_cells);
    }

    /// Page number of the next leaf in key order; 0 marks the rightmost
    /// leaf.
    pub fn leaf_next_leaf(&self) -> u32 {
        self.read_u32(LEAF_NODE_NEXT_LEAF_OFFSET)
    }

    pub fn set_leaf_next_leaf(&mut self, next_leaf: u32) {
        self.write_u32(LEAF_NODE_NEXT_LEAF_OFFSET, next_leaf);
    }

    fn leaf_cell_offset(cell_num: usize) -> Result<usize, Error> {
        if cell_num >= LEAF_NODE_MAX_CELLS {
            return Err(err!(
                Storage,
                "Leaf cell {} out of bounds (max {})",
                cell_num,
                LEAF_NODE_MAX_CELLS
            ));
        }
        Ok(LEAF_NODE_HEADER_SIZE + cell_num * LEAF_NODE_CELL_SIZE)
    }

    /// Immutable view of the cell at `cell_num` (key and value together).
    pub fn leaf_cell(&self, cell_num: usize) -> Result<&[u8], Error> {
        let offset = Self::leaf_cell_offset(cell_num)?;
        Ok(&self.data[offset..offset + LEAF_NODE_CELL_SIZE])
    }

    pub fn leaf_cell_mut(&mut self, cell_num: usize) -> Result<&mut [u8], Error> {
        let offset = Self::leaf_cell_offset(cell_num)?;
        Ok(&mut self.data[offset..offset + LEAF_NODE_CELL_SIZE])
    }

    pub fn leaf_key(&self, cell_num: usize) -> Result<u32, Error> {
        let offset = Self::leaf_cell_offset(cell_num)?;
        Ok(self.read_u32(offset))
    }

    pub fn set_leaf_key(&mut self, cell_num: usize, key: u32) -> Result<(), Error> {
        let offset = Self::leaf_cell_offset(cell_num)?;
        self.write_u32(offset, key);
        Ok(())
    }

    /// Immutable view of the serialized row stored in the cell.
    pub fn leaf_value(&self, cell_num: usize) -> Result<&[u8], Error> {
        let offset = Self::leaf_cell_offset(cell_num)? + LEAF_NODE_KEY_SIZE;
        Ok(&self.data[offset..offset + LEAF_NODE_VALUE_SIZE])
    }

    pub fn set_leaf_value(&mut self, cell_num: usize, value: &[u8]) -> Result<(), Error> {
        if value.len() != LEAF_NODE_VALUE_SIZE {
            return Err(err!(
                Storage,
                "Value size mismatch (expected={}, got={})",
                LEAF_NODE_VALUE_SIZE,
                value.len()
            ));
        }
        let offset = Self::leaf_cell_offset(cell_num)? + LEAF_NODE_KEY_SIZE;
        self.data[offset..offset + LEAF_NODE_VALUE_SIZE].copy_from_slice(value);
        Ok(())
    }

    /// Binary search within the leaf. Returns the first index holding a key
    /// greater than or equal to `key`, or `num_cells` when every key is
    /// smaller. This is the insertion point; callers check for an exact
    /// match separately.
    pub fn leaf_find(&self, key: u32) -> Result<u32, Error> {
        let mut min_index = 0;
        let mut one_past_max_index = self.leaf_num_cells();
        while one_past_max_index != min_index {
            let index = (min_index + one_past_max_index) / 2;
            let key_at_index = self.leaf_key(index as usize)?;
            if key == key_at_index {
                return Ok(index);
            }
            if key < key_at_index {
                one_past_max_index = index;
            } else {
                min_index = index + 1;
            }
        }
        Ok(min_index)
    }

    // Internal node accessors.

    pub fn internal_num_keys(&self) -> u32 {
        self.read_u32(INTERNAL_NODE_NUM_KEYS_OFFSET)
    }

    pub fn set_internal_num_keys(&mut self, num_keys: u32) {
        self.write_u32(INTERNAL_NODE_NUM_KEYS_OFFSET, num_keys);
    }

    pub fn internal_right_child(&self) -> u32 {
        self.read_u32(INTERNAL_NODE_RIGHT_CHILD_OFFSET)
    }

    pub fn set_internal_right_child(&mut self, right_child: u32) {
        self.write_u32(INTERNAL_NODE_RIGHT_CHILD_OFFSET, right_child);
    }

    fn internal_cell_offset(cell_num: usize) -> Result<usize, Error> {
        if cell_num >= INTERNAL_NODE_MAX_CELLS {
            return Err(err!(
                Storage,
                "Internal cell {} out of bounds (max {})",
                cell_num,
                INTERNAL_NODE_MAX_CELLS
            ));
        }
        Ok(INTERNAL_NODE_HEADER_SIZE + cell_num * INTERNAL_NODE_CELL_SIZE)
    }

    /// Raw `(child, key)` pair at `cell_num`, bounded by the cell cap
    /// rather than `num_keys`. Split bookkeeping reads and writes cells
    /// around the live range.
    pub fn internal_cell(&self, cell_num: usize) -> Result<(u32, u32), Error> {
        let offset = Self::internal_cell_offset(cell_num)?;
        Ok((
            self.read_u32(offset),
            self.read_u32(offset + INTERNAL_NODE_CHILD_SIZE),
        ))
    }

    pub fn set_internal_cell(&mut self, cell_num: usize, child: u32, key: u32) -> Result<(), Error> {
        let offset = Self::internal_cell_offset(cell_num)?;
        self.write_u32(offset, child);
        self.write_u32(offset + INTERNAL_NODE_CHILD_SIZE, key);
        Ok(())
    }

    /// Child page number at `child_num`, routing `child_num == num_keys` to
    /// the right child.
    ///
    /// # Errors
    /// Returns an `Error::Storage` when `child_num` exceeds `num_keys` or
    /// the resolved child is [`INVALID_PAGE_NUM`]; both indicate a corrupt
    /// tree and abort the session.
    pub fn internal_child(&self, child_num: u32) -> Result<u32, Error> {
        let num_keys = self.internal_num_keys();
        if child_num > num_keys {
            return Err(err!(
                Storage,
                "Tried to access child {} of a node with {} keys",
                child_num,
                num_keys
            ));
        }
        let child = if child_num == num_keys {
            self.internal_right_child()
        } else {
            self.internal_cell(child_num as usize)?.0
        };
        if child == INVALID_PAGE_NUM {
            return Err(err!(
                Storage,
                "Tried to follow an invalid page as child {}",
                child_num
            ));
        }
        Ok(child)
    }

    /// Binary search over internal cells. Returns the least index whose key
    /// is greater than or equal to `key`, or `num_keys` meaning "follow the
    /// right child".
    pub fn internal_find_child(&self, key: u32) -> Result<u32, Error> {
        let num_keys = self.internal_num_keys();
        let mut min_index = 0;
        let mut max_index = num_keys;
        while min_index != max_index {
            let index = (min_index + max_index) / 2;
            let (_, key_at_index) = self.internal_cell(index as usize)?;
            if key_at_index >= key {
                max_index = index;
            } else {
                min_index = index + 1;
            }
        }
        Ok(min_index)
    }

    /// Rewrites the cell key that used to be `old_key` after a child's
    /// maximum changed. The right child carries no key, so nothing needs
    /// rewriting when `old_key` belonged to it.
    pub fn update_internal_key(&mut self, old_key: u32, new_key: u32) -> Result<(), Error> {
        let index = self.internal_find_child(old_key)?;
        if index < self.internal_num_keys() {
            let (child, _) = self.internal_cell(index as usize)?;
            self.set_internal_cell(index as usize, child, new_key)?;
        }
        Ok(())
    }
}

/// Resets a page to an empty, non-root leaf.
pub fn initialize_leaf_node(node: &mut Node) {
    node.set_node_type(NodeType::Leaf);
    node.set_root(false);
    node.set_leaf_num_cells(0);
    node.set_leaf_next_leaf(0);
}

/// Resets a page to an empty, non-root internal node. The right child
/// starts out invalid: page 0 is the root, so leaving it zeroed would make
/// the fresh node a parent of the root.
pub fn initialize_internal_node(node: &mut Node) {
    node.set_node_type(NodeType::Internal);
    node.set_root(false);
    node.set_internal_num_keys(0);
    node.set_internal_right_child(INVALID_PAGE_NUM);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_constants() {
        assert_eq!(COMMON_NODE_HEADER_SIZE, 6);
        assert_eq!(LEAF_NODE_HEADER_SIZE, 14);
        assert_eq!(LEAF_NODE_CELL_SIZE, 297);
        assert_eq!(LEAF_NODE_SPACE_FOR_CELLS, 4082);
        assert_eq!(LEAF_NODE_MAX_CELLS, 13);
        assert_eq!(LEAF_NODE_LEFT_SPLIT_COUNT, 7);
        assert_eq!(LEAF_NODE_RIGHT_SPLIT_COUNT, 7);
        assert_eq!(INTERNAL_NODE_HEADER_SIZE, 14);
        assert_eq!(INTERNAL_NODE_CELL_SIZE, 8);
    }

    #[test]
    fn test_initialize_leaf_node() {
        let mut node = Node::new();
        initialize_leaf_node(&mut node);
        assert_eq!(node.node_type().unwrap(), NodeType::Leaf);
        assert!(!node.is_root());
        assert_eq!(node.leaf_num_cells(), 0);
        assert_eq!(node.leaf_next_leaf(), 0);
    }

    #[test]
    fn test_initialize_internal_node() {
        let mut node = Node::new();
        initialize_internal_node(&mut node);
        assert_eq!(node.node_type().unwrap(), NodeType::Internal);
        assert_eq!(node.internal_num_keys(), 0);
        assert_eq!(node.internal_right_child(), INVALID_PAGE_NUM);
    }

    #[test]
    fn test_invalid_node_type_byte() {
        let mut node = Node::new();
        node.data[0] = 7;
        assert!(node.node_type().is_err());
    }

    #[test]
    fn test_leaf_cell_round_trip() {
        let mut node = Node::new();
        initialize_leaf_node(&mut node);
        let value = [0xabu8; LEAF_NODE_CELL_SIZE - LEAF_NODE_KEY_SIZE];
        node.set_leaf_key(LEAF_NODE_MAX_CELLS - 1, 99).unwrap();
        node.set_leaf_value(LEAF_NODE_MAX_CELLS - 1, &value).unwrap();
        assert_eq!(node.leaf_key(LEAF_NODE_MAX_CELLS - 1).unwrap(), 99);
        assert_eq!(node.leaf_value(LEAF_NODE_MAX_CELLS - 1).unwrap(), &value);
    }

    #[test]
    fn test_leaf_cell_out_of_bounds() {
        let node = Node::new();
        assert!(node.leaf_cell(LEAF_NODE_MAX_CELLS).is_err());
    }

    #[test]
    fn test_leaf_find_returns_insertion_point() {
        let mut node = Node::new();
        initialize_leaf_node(&mut node);
        for (i, key) in [1u32, 3, 5].iter().enumerate() {
            node.set_leaf_key(i, *key).unwrap();
        }
        node.set_leaf_num_cells(3);
        assert_eq!(node.leaf_find(0).unwrap(), 0);
        assert_eq!(node.leaf_find(3).unwrap(), 1);
        assert_eq!(node.leaf_find(4).unwrap(), 2);
        assert_eq!(node.leaf_find(9).unwrap(), 3);
    }

    #[test]
    fn test_internal_find_child() {
        let mut node = Node::new();
        initialize_internal_node(&mut node);
        node.set_internal_cell(0, 10, 10).unwrap();
        node.set_internal_cell(1, 11, 20).unwrap();
        node.set_internal_num_keys(2);
        assert_eq!(node.internal_find_child(5).unwrap(), 0);
        assert_eq!(node.internal_find_child(10).unwrap(), 0);
        assert_eq!(node.internal_find_child(15).unwrap(), 1);
        assert_eq!(node.internal_find_child(25).unwrap(), 2);
    }

    #[test]
    fn test_internal_child_routing() {
        let mut node = Node::new();
        initialize_internal_node(&mut node);
        node.set_internal_cell(0, 4, 10).unwrap();
        node.set_internal_num_keys(1);
        node.set_internal_right_child(5);
        assert_eq!(node.internal_child(0).unwrap(), 4);
        assert_eq!(node.internal_child(1).unwrap(), 5);
        assert!(node.internal_child(2).is_err());
    }

    #[test]
    fn test_internal_child_invalid_page() {
        let mut node = Node::new();
        initialize_internal_node(&mut node);
        // num_keys == 0, so child 0 routes to the invalid right child.
        assert!(node.internal_child(0).is_err());
    }

    #[test]
    fn test_update_internal_key() {
        let mut node = Node::new();
        initialize_internal_node(&mut node);
        node.set_internal_cell(0, 4, 10).unwrap();
        node.set_internal_num_keys(1);
        node.set_internal_right_child(5);
        node.update_internal_key(10, 8).unwrap();
        assert_eq!(node.internal_cell(0).unwrap(), (4, 8));
        // A key above every cell belongs to the right child; nothing to do.
        node.update_internal_key(50, 40).unwrap();
        assert_eq!(node.internal_cell(0).unwrap(), (4, 8));
    }
}

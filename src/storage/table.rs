//! # Table and Tree Operations
//!
//! A table is a root page number plus a pager; the root always lives on
//! page 0. Insertion descends to a leaf and either places the cell in
//! order or splits the leaf, which can cascade upward: a split leaf posts
//! its new sibling to the parent, a full parent splits in turn, and a
//! splitting root copies itself into a fresh left child so page 0 can be
//! re-initialized as the new root. At most one split happens per level, so
//! the cascade is bounded by the tree height.
//!
//! Every operation leaves the tree satisfying the same shape rules: cell
//! keys in internal nodes equal the maximum key of their child subtree,
//! the right child holds strictly greater keys than every cell, leaf cells
//! are sorted, and the leaf chain visits all keys in ascending order.

use super::btree::{self, NodeType};
use super::cursor::Cursor;
use super::pager::Pager;
use super::row::Row;
use crate::errors::Error;
use std::io;
use std::path::Path;
use tracing::debug;

pub struct Table {
    pub root_page_num: u32,
    pub pager: Pager,
}

impl Table {
    /// Opens a database file, initializing page 0 as an empty leaf root
    /// when the file is new.
    pub fn open(path: &Path) -> Result<Self, Error> {
        let mut pager = Pager::open(path)?;
        if pager.num_pages() == 0 {
            pager.materialize(0)?;
            let mut root = pager.get(0)?;
            btree::initialize_leaf_node(&mut root);
            root.set_root(true);
        }
        Ok(Table {
            root_page_num: 0,
            pager,
        })
    }

    /// Flushes every resident page and releases the file.
    pub fn close(&mut self) -> Result<(), Error> {
        self.pager.close()
    }

    pub fn insert(&mut self, row: &Row) -> Result<(), Error> {
        insert_row(self, row)
    }

    pub fn select(&mut self) -> Result<Vec<Row>, Error> {
        select_rows(self)
    }

    /// Writes the pre-order tree dump used by the `.btree` meta command.
    pub fn print_tree(&mut self, out: &mut dyn io::Write) -> Result<(), Error> {
        let root_page_num = self.root_page_num;
        print_tree_node(self, out, root_page_num, 0)
    }
}

/// Inserts a row keyed by its id, rejecting duplicates.
pub fn insert_row(table: &mut Table, row: &Row) -> Result<(), Error> {
    let key = row.id;
    let row_bin = row.serialize();
    debug!(key, "Inserting row");

    let mut cursor = Cursor::find(table, key)?;

    let num_cells = cursor.table.pager.get(cursor.page_num)?.leaf_num_cells();
    if cursor.cell_num < num_cells {
        let key_at_index = cursor
            .table
            .pager
            .get(cursor.page_num)?
            .leaf_key(cursor.cell_num as usize)?;
        if key_at_index == key {
            return Err(Error::DuplicateKey);
        }
    }

    if num_cells as usize >= btree::LEAF_NODE_MAX_CELLS {
        return leaf_node_split_and_insert(&mut cursor, key, &row_bin);
    }

    let mut node = cursor.table.pager.get(cursor.page_num)?;
    if cursor.cell_num < num_cells {
        // Make room for the new cell.
        for i in ((cursor.cell_num as usize + 1)..=(num_cells as usize)).rev() {
            let prev = node.leaf_cell(i - 1)?.to_vec();
            node.leaf_cell_mut(i)?.copy_from_slice(&prev);
        }
    }
    node.set_leaf_num_cells(num_cells + 1);
    node.set_leaf_key(cursor.cell_num as usize, key)?;
    node.set_leaf_value(cursor.cell_num as usize, &row_bin)?;
    Ok(())
}

/// Reads every row in ascending key order by walking the leaf chain.
pub fn select_rows(table: &mut Table) -> Result<Vec<Row>, Error> {
    let mut rows = Vec::new();
    let mut cursor = Cursor::start(table)?;
    let mut buf = Vec::new();
    while !cursor.end_of_table {
        cursor.read_value(&mut buf)?;
        rows.push(Row::deserialize(&buf)?);
        cursor.advance()?;
    }
    Ok(rows)
}

/// Splits a full leaf and inserts the pending cell.
///
/// The existing cells plus the new one are redistributed evenly between
/// the old (left) node and a fresh right sibling, working from the highest
/// index down so nothing is overwritten before it is copied. The sibling
/// is spliced into the leaf chain, then the parent learns the left node's
/// new maximum and adopts the sibling; a splitting root goes through
/// [`create_new_root`] instead.
fn leaf_node_split_and_insert(cursor: &mut Cursor, key: u32, value: &[u8]) -> Result<(), Error> {
    debug!(page_num = cursor.page_num, key, "Splitting leaf node");
    let old_max = cursor.table.pager.node_max_key(cursor.page_num)?;
    let new_page_num = cursor.table.pager.get_unused_page_num()?;
    cursor.table.pager.materialize(new_page_num)?;

    let mut old_node = cursor.table.pager.get(cursor.page_num)?;
    let mut new_node = cursor.table.pager.get(new_page_num)?;
    btree::initialize_leaf_node(&mut new_node);
    new_node.set_parent(old_node.parent());

    // The new leaf takes over the old leaf's chain position.
    new_node.set_leaf_next_leaf(old_node.leaf_next_leaf());
    old_node.set_leaf_next_leaf(new_page_num);

    // Pre-split snapshot used as the copy source while both nodes are
    // rewritten in place.
    let old = old_node.clone();
    for i in (0..=btree::LEAF_NODE_MAX_CELLS).rev() {
        let dest_node = if i >= btree::LEAF_NODE_LEFT_SPLIT_COUNT {
            &mut new_node
        } else {
            &mut old_node
        };
        let cell_num = i % btree::LEAF_NODE_LEFT_SPLIT_COUNT;
        if i == cursor.cell_num as usize {
            dest_node.set_leaf_key(cell_num, key)?;
            dest_node.set_leaf_value(cell_num, value)?;
        } else if i > cursor.cell_num as usize {
            dest_node
                .leaf_cell_mut(cell_num)?
                .copy_from_slice(old.leaf_cell(i - 1)?);
        } else {
            dest_node
                .leaf_cell_mut(cell_num)?
                .copy_from_slice(old.leaf_cell(i)?);
        }
    }

    old_node.set_leaf_num_cells(btree::LEAF_NODE_LEFT_SPLIT_COUNT as u32);
    new_node.set_leaf_num_cells(btree::LEAF_NODE_RIGHT_SPLIT_COUNT as u32);

    let was_root = old_node.is_root();
    let parent_page_num = old_node.parent();
    drop(old_node);
    drop(new_node);

    if was_root {
        return create_new_root(cursor.table, new_page_num);
    }

    let new_max = cursor.table.pager.node_max_key(cursor.page_num)?;
    {
        let mut parent = cursor.table.pager.page(parent_page_num)?;
        parent.update_internal_key(old_max, new_max)?;
    }
    internal_node_insert(cursor.table, parent_page_num, new_page_num)
}

/// Rebuilds the root after it splits.
///
/// The old root is copied verbatim into a freshly allocated left child so
/// page 0 can stay the root, then page 0 is re-initialized as an internal
/// node with exactly one key: `child(0)` is the copy, the key is its
/// maximum, and the right child is the sibling produced by the split.
fn create_new_root(table: &mut Table, right_child_page_num: u32) -> Result<(), Error> {
    debug!(right_child_page_num, "Creating new root");
    let root_page_num = table.root_page_num;
    let left_child_page_num = table.pager.get_unused_page_num()?;
    table.pager.materialize(left_child_page_num)?;
    table.pager.materialize(right_child_page_num)?;

    {
        let root = table.pager.get(root_page_num)?;
        let mut left_child = table.pager.get(left_child_page_num)?;
        if root.node_type()? == NodeType::Internal {
            // A splitting internal root hands over a freshly allocated,
            // still-blank sibling; a leaf sibling arrives initialized.
            let mut right_child = table.pager.get(right_child_page_num)?;
            btree::initialize_internal_node(&mut right_child);
            btree::initialize_internal_node(&mut left_child);
        }
        left_child.data.copy_from_slice(&root.data);
        left_child.set_root(false);
    }

    // The copy now owns the old root's children; re-aim their parent
    // pointers.
    let moved_children = {
        let left_child = table.pager.get(left_child_page_num)?;
        if left_child.node_type()? == NodeType::Internal {
            let mut children = Vec::new();
            for i in 0..=left_child.internal_num_keys() {
                children.push(left_child.internal_child(i)?);
            }
            children
        } else {
            Vec::new()
        }
    };
    for child_page_num in moved_children {
        let mut child = table.pager.page(child_page_num)?;
        child.set_parent(left_child_page_num);
    }

    let left_child_max_key = table.pager.node_max_key(left_child_page_num)?;

    {
        let mut root = table.pager.get(root_page_num)?;
        btree::initialize_internal_node(&mut root);
        root.set_root(true);
        root.set_internal_num_keys(1);
        root.set_internal_cell(0, left_child_page_num, left_child_max_key)?;
        root.set_internal_right_child(right_child_page_num);
    }
    table.pager.get(left_child_page_num)?.set_parent(root_page_num);
    table
        .pager
        .get(right_child_page_num)?
        .set_parent(root_page_num);
    Ok(())
}

/// Adds a child to an internal node, keyed by the child subtree's maximum.
///
/// The rightmost child is stored apart from the cell array, so a child
/// whose maximum exceeds the current right subtree's maximum replaces the
/// right child and demotes it into the cells; every other child is placed
/// at its sorted slot after shifting the tail. `num_keys` is written last,
/// once the cells are consistent. A node already at
/// [`btree::INTERNAL_NODE_MAX_CELLS`] splits instead.
fn internal_node_insert(
    table: &mut Table,
    parent_page_num: u32,
    child_page_num: u32,
) -> Result<(), Error> {
    let child_max_key = table.pager.node_max_key(child_page_num)?;

    table.pager.materialize(parent_page_num)?;
    let (index, original_num_keys, right_child_page_num) = {
        let parent = table.pager.get(parent_page_num)?;
        (
            parent.internal_find_child(child_max_key)?,
            parent.internal_num_keys(),
            parent.internal_right_child(),
        )
    };

    if original_num_keys as usize >= btree::INTERNAL_NODE_MAX_CELLS {
        return internal_node_split_and_insert(table, parent_page_num, child_page_num);
    }

    // An internal node with an invalid right child is empty; the first
    // child it adopts becomes the right child.
    if right_child_page_num == btree::INVALID_PAGE_NUM {
        table
            .pager
            .get(parent_page_num)?
            .set_internal_right_child(child_page_num);
        table.pager.page(child_page_num)?.set_parent(parent_page_num);
        return Ok(());
    }

    let right_child_max = table.pager.node_max_key(right_child_page_num)?;

    {
        let mut parent = table.pager.get(parent_page_num)?;
        if child_max_key > right_child_max {
            // The new child becomes the rightmost; the old right child
            // moves into the cell array under its own maximum.
            parent.set_internal_cell(
                original_num_keys as usize,
                right_child_page_num,
                right_child_max,
            )?;
            parent.set_internal_right_child(child_page_num);
        } else {
            for i in ((index as usize + 1)..=(original_num_keys as usize)).rev() {
                let (child, cell_key) = parent.internal_cell(i - 1)?;
                parent.set_internal_cell(i, child, cell_key)?;
            }
            parent.set_internal_cell(index as usize, child_page_num, child_max_key)?;
        }
        parent.set_internal_num_keys(original_num_keys + 1);
    }
    table.pager.page(child_page_num)?.set_parent(parent_page_num);
    Ok(())
}

/// Splits a full internal node and inserts the pending child.
///
/// The right child and the cells above the midpoint move into a fresh
/// sibling one by one, each re-inserted under its own maximum; the highest
/// remaining cell child is then promoted to be the old node's right child.
/// The pending child is routed into whichever half covers its key range,
/// the parent's key for the old node is rewritten to its shrunken maximum,
/// and a non-root split finally posts the sibling to the parent, which may
/// split again one level up. A splitting root goes through
/// [`create_new_root`] first and the old contents are reached through the
/// root's new left child.
fn internal_node_split_and_insert(
    table: &mut Table,
    parent_page_num: u32,
    child_page_num: u32,
) -> Result<(), Error> {
    let mut old_page_num = parent_page_num;
    let old_max = table.pager.node_max_key(old_page_num)?;
    let child_max = table.pager.node_max_key(child_page_num)?;
    debug!(
        page_num = old_page_num,
        child_page_num, "Splitting internal node"
    );

    let new_page_num = table.pager.get_unused_page_num()?;
    table.pager.materialize(new_page_num)?;

    let splitting_root = table.pager.get(old_page_num)?.is_root();

    let parent_page: u32;
    if splitting_root {
        create_new_root(table, new_page_num)?;
        parent_page = table.root_page_num;
        old_page_num = table.pager.get(parent_page)?.internal_child(0)?;
    } else {
        parent_page = table.pager.get(old_page_num)?.parent();
        let mut new_node = table.pager.get(new_page_num)?;
        btree::initialize_internal_node(&mut new_node);
    }

    // Move the right child over first, then the cells above the midpoint,
    // highest first.
    let old_right_child = {
        let mut old_node = table.pager.get(old_page_num)?;
        let right_child = old_node.internal_right_child();
        old_node.set_internal_right_child(btree::INVALID_PAGE_NUM);
        right_child
    };
    internal_node_insert(table, new_page_num, old_right_child)?;

    for i in ((btree::INTERNAL_NODE_MAX_CELLS / 2 + 1)..btree::INTERNAL_NODE_MAX_CELLS).rev() {
        let moved_child = {
            let mut old_node = table.pager.get(old_page_num)?;
            let (child, _) = old_node.internal_cell(i)?;
            let num_keys = old_node.internal_num_keys();
            old_node.set_internal_num_keys(num_keys - 1);
            child
        };
        internal_node_insert(table, new_page_num, moved_child)?;
    }

    // Promote the highest remaining cell child to be the right child.
    {
        let mut old_node = table.pager.get(old_page_num)?;
        let num_keys = old_node.internal_num_keys();
        let (promoted, _) = old_node.internal_cell(num_keys as usize - 1)?;
        old_node.set_internal_right_child(promoted);
        old_node.set_internal_num_keys(num_keys - 1);
    }

    // Route the pending child into whichever half now covers its range.
    let max_after_split = table.pager.node_max_key(old_page_num)?;
    let destination_page_num = if child_max < max_after_split {
        old_page_num
    } else {
        new_page_num
    };
    internal_node_insert(table, destination_page_num, child_page_num)?;

    {
        let old_new_max = table.pager.node_max_key(old_page_num)?;
        let mut parent = table.pager.page(parent_page)?;
        parent.update_internal_key(old_max, old_new_max)?;
    }

    if !splitting_root {
        internal_node_insert(table, parent_page, new_page_num)?;
    }
    Ok(())
}

fn print_tree_node(
    table: &mut Table,
    out: &mut dyn io::Write,
    page_num: u32,
    level: usize,
) -> Result<(), Error> {
    table.pager.materialize(page_num)?;
    let node_type = table.pager.get(page_num)?.node_type()?;
    match node_type {
        NodeType::Leaf => {
            let keys = {
                let node = table.pager.get(page_num)?;
                let mut keys = Vec::new();
                for i in 0..node.leaf_num_cells() {
                    keys.push(node.leaf_key(i as usize)?);
                }
                keys
            };
            indent(out, level)?;
            writeln!(out, "- leaf (size {})", keys.len())?;
            for key in keys {
                indent(out, level + 1)?;
                writeln!(out, "- {}", key)?;
            }
        }
        NodeType::Internal => {
            let (cells, right_child) = {
                let node = table.pager.get(page_num)?;
                let mut cells = Vec::new();
                for i in 0..node.internal_num_keys() {
                    cells.push(node.internal_cell(i as usize)?);
                }
                (cells, node.internal_right_child())
            };
            indent(out, level)?;
            writeln!(out, "- internal (size {})", cells.len())?;
            if !cells.is_empty() {
                for (child, key) in cells {
                    print_tree_node(table, out, child, level + 1)?;
                    indent(out, level + 1)?;
                    writeln!(out, "- key {}", key)?;
                }
                print_tree_node(table, out, right_child, level + 1)?;
            }
        }
    }
    Ok(())
}

fn indent(out: &mut dyn io::Write, level: usize) -> Result<(), Error> {
    for _ in 0..level {
        write!(out, "   ")?;
    }
    Ok(())
}

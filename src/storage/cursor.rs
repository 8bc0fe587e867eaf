//! # Cursor
//!
//! A cursor is a position on the leaf chain: `(page_num, cell_num)` plus an
//! end-of-table flag. [`Cursor::find`] descends the tree from the root and
//! always lands on a leaf; [`Cursor::advance`] walks cells within a leaf
//! and follows `next_leaf` across leaves, so a scan started from key 0
//! visits every row in ascending key order.
//!
//! A cursor borrows the table mutably for its entire lifetime. Any
//! mutating call invalidates previously obtained cursors.

use super::btree::NodeType;
use super::table::Table;
use crate::errors::Error;

pub struct Cursor<'a> {
    pub table: &'a mut Table,
    pub page_num: u32,
    pub cell_num: u32,
    pub end_of_table: bool,
}

impl<'a> Cursor<'a> {
    /// Positions a cursor at the first row of the table.
    pub fn start(table: &'a mut Table) -> Result<Self, Error> {
        let mut cursor = Cursor::find(table, 0)?;
        let num_cells = cursor.table.pager.get(cursor.page_num)?.leaf_num_cells();
        cursor.end_of_table = num_cells == 0;
        Ok(cursor)
    }

    /// Descends from the root to the leaf covering `key` and positions the
    /// cursor at the matching cell or the insertion point.
    pub fn find(table: &'a mut Table, key: u32) -> Result<Self, Error> {
        let mut page_num = table.root_page_num;
        loop {
            table.pager.materialize(page_num)?;
            let node_type = table.pager.get(page_num)?.node_type()?;
            match node_type {
                NodeType::Leaf => {
                    let cell_num = table.pager.get(page_num)?.leaf_find(key)?;
                    return Ok(Cursor {
                        table,
                        page_num,
                        cell_num,
                        end_of_table: false,
                    });
                }
                NodeType::Internal => {
                    let node = table.pager.get(page_num)?;
                    let child_index = node.internal_find_child(key)?;
                    page_num = node.internal_child(child_index)?;
                }
            }
        }
    }

    /// Copies the serialized row under the cursor into `buf`.
    pub fn read_value(&mut self, buf: &mut Vec<u8>) -> Result<(), Error> {
        let node = self.table.pager.get(self.page_num)?;
        let value = node.leaf_value(self.cell_num as usize)?;
        buf.clear();
        buf.extend_from_slice(value);
        Ok(())
    }

    /// Moves to the next cell, hopping to the next leaf when the current
    /// one is exhausted.
    pub fn advance(&mut self) -> Result<(), Error> {
        let (num_cells, next_leaf) = {
            let node = self.table.pager.get(self.page_num)?;
            (node.leaf_num_cells(), node.leaf_next_leaf())
        };
        self.cell_num += 1;
        if self.cell_num >= num_cells {
            // next_leaf of 0 marks the rightmost leaf. Page 0 is always the
            // root, so the sentinel can never collide with a real sibling.
            if next_leaf == 0 {
                self.end_of_table = true;
            } else {
                self.table.pager.materialize(next_leaf)?;
                self.page_num = next_leaf;
                self.cell_num = 0;
            }
        }
        Ok(())
    }
}

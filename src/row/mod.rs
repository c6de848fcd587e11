//! Row buffers and the cursors that read and edit them.

mod buffer;
mod column_op;
mod cursor;
mod default_op;
mod navigation;
mod read_op;
mod unique_op;
mod write_op;

pub use buffer::{RowBuffer, UnboundRowBuffer};
pub use cursor::RowCursor;
pub use unique_op::UniqueIndexItem;

#[cfg(test)]
mod tests;

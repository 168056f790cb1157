//! Core data types and I/O operations.

pub mod grouping;
pub mod loaders;
pub mod table;
pub mod transforms;
pub mod writers;

pub use grouping::{grouper, Grouper};
pub use loaders::{load_position_csv, load_table_csv, LoaderError, PositionSeries, Role};
pub use table::{Column, Table, TableError};
pub use transforms::{frame_displacement, merge_and_resample, AlignmentError};
pub use writers::{write_table_csv, write_table_json, WriteError};

//! Background modelling and foreground extraction.

mod cell;
mod foreground;
mod grid;
mod snapshot;

pub use cell::BackgroundCell;
pub use foreground::{ForegroundExtractor, ForegroundResult, ForegroundStats};
pub use grid::{BackgroundGrid, PointClass};
pub use snapshot::{BackgroundSnapshot, GridHealth};

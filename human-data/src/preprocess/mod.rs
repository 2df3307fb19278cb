//! Per-sample preprocessing collaborators.

mod augmentation;
mod bbox;
mod db_coord;
mod human_model;
mod image;

pub use self::bbox::*;
pub use self::image::*;
pub use augmentation::*;
pub use db_coord::*;
pub use human_model::*;

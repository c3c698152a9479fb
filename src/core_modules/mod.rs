pub mod blob;
pub mod blob_reducer;
pub mod body_part;
pub mod buffers;
pub mod classifier;
pub mod color_map;
pub mod components;
pub mod grid;
pub mod relations;
pub mod smoother;
pub mod tree;

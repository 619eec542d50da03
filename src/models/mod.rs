pub mod actions;
pub mod playback;
pub mod tasks;
pub mod universe;

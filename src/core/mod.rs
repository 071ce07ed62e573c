pub mod process;
pub mod results;
pub mod text;
pub mod video;

pub mod fonts;
pub mod prepare;
pub mod render;

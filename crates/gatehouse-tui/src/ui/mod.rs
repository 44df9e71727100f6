//! Terminal UI module using ratatui.
//!
//! - `render`: frame layout and page rendering
//! - `input`: keyboard event handling
//! - `styles`: colors and text styles

pub mod input;
pub mod render;
pub mod styles;

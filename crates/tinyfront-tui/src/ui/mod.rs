//! Terminal UI module using ratatui.
//!
//! - `render`: frame layout, output pane and overlays
//! - `input`: keyboard and paste handling
//! - `styles`: color scheme and text styling

pub mod input;
pub mod render;
pub mod styles;

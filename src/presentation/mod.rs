//! Presentation writers for render trees.

pub mod html;

//! UI binding helpers: auto-hiding controls, the resume chip and shortcuts.

pub mod controls;
pub mod resume_chip;
pub mod shortcuts;

pub use controls::AutoHideControls;
pub use resume_chip::{ChipAction, ResumeChip, format_elapsed};
pub use shortcuts::Shortcut;

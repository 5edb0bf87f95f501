//! TUI module for terminal user interfaces

mod assess_view;

pub use assess_view::AssessApp;

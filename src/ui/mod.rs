pub mod icons;
pub mod report;
pub mod session_ui;

pub use session_ui::SessionUI;

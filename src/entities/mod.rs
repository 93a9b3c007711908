pub mod child;
pub mod objective;
pub mod plan;
pub mod progress_entry;
pub mod selected_child;

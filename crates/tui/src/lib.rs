mod app;
pub mod confirm;
pub mod event;
mod ui;

pub use app::App;

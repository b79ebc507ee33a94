pub mod build;
pub mod clean;
pub mod fetch;
pub mod ui;
pub mod view;

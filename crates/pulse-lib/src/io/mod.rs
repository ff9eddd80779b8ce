pub mod history;
pub mod text;

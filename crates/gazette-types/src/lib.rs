pub mod input;
pub mod models;
pub mod session;
pub mod slug;

pub use slug::slugify;

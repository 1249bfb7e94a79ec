pub mod admin;
pub mod error;
pub mod forms;
pub mod mail;
pub mod media;
pub mod messages;
pub mod middleware;
pub mod news;
pub mod password;
pub mod router;
pub mod session;
pub mod state;
pub mod templates;
pub mod tokens;
pub mod users;

pub use error::AppError;
pub use state::{AppState, AppStateInner};

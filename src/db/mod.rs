pub mod core;
pub mod favorite;
mod schema;
pub mod task;
pub mod user;

// Re-export Database and essential traits
pub use self::core::{Database, DbConstraintErrorExt};
pub use self::favorite::{FavoriteRecord, NewFavorite};
pub use self::task::{TaskRecord, TaskStatus};
pub use self::user::UserRecord;
pub use sqlx::Row;

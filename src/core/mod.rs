pub mod draft;
pub mod mirror;
pub mod note;
pub mod record;
pub mod task;

pub mod assistants;
pub mod chat;
pub mod providers;
pub mod usage;
pub mod users;

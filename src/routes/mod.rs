pub mod auth;
pub mod health;
pub mod items;
pub mod uploads;
pub mod users;

pub mod auth;
pub mod health;
pub mod oauth2;
pub mod setup;
pub mod social;
pub mod twofactor;

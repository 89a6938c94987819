pub mod auth;
pub mod conversations;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod profile;
pub mod routes;
pub mod users;

pub mod connection;
pub mod delivery;
pub mod dispatcher;

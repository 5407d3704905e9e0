//! Types shared between the session engine, the REST layer and the
//! messaging-transport webhook.

pub mod api;
pub mod events;
pub mod models;

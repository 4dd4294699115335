//! Data Transfer Objects (DTOs) for the room messaging service.
//!
//! DTOs are organized by protocol:
//! - `http`: HTTP API request / response DTOs
//! - `websocket`: inbound WebSocket frame DTOs

pub mod http;
pub mod websocket;

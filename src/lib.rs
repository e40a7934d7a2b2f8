pub mod bootstrap;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod repositories;
pub mod services;

pub use error::{InvalidReason, TokenError};
pub use services::{TokenService, Validation};

pub mod hasher;
pub mod token;

pub use hasher::{Argon2Hasher, SecretHasher};
pub use token::{TokenService, Validation};

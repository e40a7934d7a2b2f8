pub mod token;

pub use token::{NewToken, Token};

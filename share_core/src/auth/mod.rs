pub mod jwt;

pub use jwt::{JwtClaims, JwtService};

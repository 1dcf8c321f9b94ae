/// OAuth client-credentials token exchange.
pub mod credentials;

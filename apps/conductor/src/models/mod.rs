pub mod envelope;
pub mod session;

pub mod client;
pub(crate) mod clients;
pub mod error;
pub mod request;
pub mod server;

#[cfg(test)]
mod tests;

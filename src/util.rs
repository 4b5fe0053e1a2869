pub mod http_transport;
pub mod staging;
pub mod transport;

#[cfg(test)]
pub mod memory_transport;

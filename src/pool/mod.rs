mod backend;
mod connection;
mod options;
mod stateless;
mod tls;

pub use backend::Backend;
pub use connection::ConnectionError;
pub use options::ConnectOptions;
pub use stateless::{ConnectionPool, PoolConfig};

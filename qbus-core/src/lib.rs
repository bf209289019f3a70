pub mod bus;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod topology;

pub use bus::RequestBus;
pub use envelope::{Envelope, Reply};
pub use error::BusError;
pub use handler::RequestHandler;
pub use topology::Topology;

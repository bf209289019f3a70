mod connection;
mod coordinator;
mod options;
mod publisher;
mod reply;
mod responder;

pub use connection::BrokerConnection;
pub use coordinator::RequestCoordinator;
pub use options::AmqpOptions;
pub use responder::Responder;

//! Queue provider implementations.

mod amqp;
mod memory;

pub use amqp::AmqpProvider;
pub use memory::InMemoryProvider;

//! Typed publish/subscribe dispatcher for Peril.
//!
//! One dispatcher serves every message type: [`publish`] encodes any
//! `Serialize` value, and [`subscribe`] feeds decoded values of any
//! `DeserializeOwned` type to a handler.
//!
//! Handlers return an [`AckType`]; the dispatcher is the only component
//! that acknowledges deliveries. Every delivery gets exactly one
//! resolution:
//!
//! | handler / decode result | broker action                   |
//! |-------------------------|---------------------------------|
//! | `Ack`                   | ack                             |
//! | `NackRequeue`           | nack, requeue                   |
//! | `NackDiscard`           | nack, no requeue (dead-letter)  |
//! | decode failure          | logged, then as `NackDiscard`   |

mod ack;
mod error;
mod publish;
mod subscribe;

pub use ack::{resolve, AckType};
pub use error::PubSubError;
pub use publish::{publish, Publisher};
pub use subscribe::{subscribe, subscribe_with_decoder, SubscribeOptions, Subscription};

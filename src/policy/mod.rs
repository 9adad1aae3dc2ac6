//! Policy and value network implementations

pub mod net;

pub use net::{ActorCritic, Activation, NetConfig};

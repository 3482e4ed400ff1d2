//! Rollout strategies

mod blue_green;
mod canary;
mod rolling;

pub use blue_green::{BlueGreen, BLUE, GREEN};
pub use canary::{polls_per_window, Canary};
pub use rolling::{batch_size, Rolling};

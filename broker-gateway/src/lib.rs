//! Brokerage adapters for the intraday engine.
//!
//! * [`kite::KiteClient`] talks to the Kite Connect v3 REST API.
//! * [`paper::PaperBroker`] simulates a brokerage in memory for dry runs and tests.
//! * [`retry::RetryPolicy`] bounds every remote call with a timeout and a
//!   small number of retries for transient failures.

pub mod kite;
pub mod paper;
pub mod retry;

pub use kite::{KiteClient, KiteConfig};
pub use paper::{PaperBroker, SyntheticMarket};
pub use retry::RetryPolicy;

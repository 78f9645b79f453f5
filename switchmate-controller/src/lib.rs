//! Switchmate BLE Controller
//!
//! Finds Switchmate light switches, retrieves their auth key and toggles
//! them. A sans-IO [`machine::Machine`] decides what to do next; the
//! [`runner`] executes its actions against a [`RadioAdapter`] under a single
//! deadline.
//!
//! # Example
//!
//! ```ignore
//! use switchmate_controller::{BtleAdapter, Options, Report, SwitchPosition, Workflow, run};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let workflow = Workflow::toggle(
//!         SwitchPosition::On,
//!         "5B2F1E0A-6C3D-4E8F-9A1B-2C3D4E5F6A7B",
//!         "ESIz",
//!     )?;
//!     let mut adapter = BtleAdapter::new().await?;
//!
//!     match run(workflow, &mut adapter, &Options::default(), &mut std::io::stdout()).await? {
//!         Report::Toggled(position) => println!("switched {position}"),
//!         _ => {}
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod ble;
mod error;
pub mod machine;
pub mod runner;
pub mod supervisor;
pub mod workflow;

pub use adapter::{AdapterError, DiscoveredPeripheral, PeripheralId, RadioAdapter};
pub use ble::BtleAdapter;
pub use error::Error;
pub use machine::{Outcome, Report, State};
pub use runner::run;
pub use workflow::{AuthKey, DEFAULT_TIMEOUT, InputError, Options, SwitchPosition, Workflow};

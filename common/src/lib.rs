pub mod climate;
pub mod commands;
pub mod config;
pub mod error;
pub mod power;
pub mod profile;
pub mod regulator;
pub mod state;
pub mod types;

pub use climate::{ClimateEngine, EngineAction, Observation};
pub use commands::{CommandLookupError, CommandPayload, CommandRequest, CommandStep, CommandTable};
pub use config::{ClimateConfig, NetworkConfig, RuntimeConfig};
pub use error::ClimateError;
pub use power::{parse_power_meter, PowerCoordinator, PowerPlan};
pub use profile::{DeviceProfile, ProfileError};
pub use regulator::{Regulation, Regulator, RegulatorInput, RegulatorSettings};
pub use state::{ClimateAttributes, ClimateSnapshot, ClimateStatus};
pub use types::{format_temperature, HvacMode, PowerLevel, Precision, SensorState};

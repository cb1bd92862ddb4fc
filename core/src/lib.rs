pub mod aggregate;
pub mod config;
pub mod conversion;
pub mod correlate;
pub mod error;
pub mod ffi;
pub mod import;
pub mod models;
pub mod photo;
pub mod profile;
pub mod project;
pub mod store;
pub mod timestamp;
pub mod units;

uniffi::setup_scaffolding!();

pub use aggregate::{DepthClass, DiveStats, GlobalStats, TripReport, TripStats};
pub use config::CoreConfig;
pub use conversion::{ConversionEvent, ConversionJob, ConversionTask, RawConverter};
pub use correlate::{correlate_photos, DiveIndex};
pub use error::CoreError;
pub use ffi::DiveStudio;
pub use import::{ImportReport, ImportSource, MemorySource, RawDiveRow, ShearwaterDb};
pub use models::{ComputerInfo, DiveId, DiveRecord, PhotoAsset, Trip};
pub use profile::{ProfileParams, SynthesizedProfile};
pub use project::ProjectState;
pub use store::{DiveQuery, DiveRecordStore};
pub use units::{DepthUnit, PressureUnit, UnitPrefs};

pub mod constants;
pub mod panel;
pub mod status;

pub use panel::{ApiEnvelope, CreateEnvRequest, EnvId, RemoteEnv, TokenData, UpdateEnvRequest};
pub use status::{Badge, ControlMessage, StatusSnapshot, SyncResponse};

pub mod device_poller;

pub use device_poller::{DevicePoller, PollError, PollStage, POLL_TIMEOUT};

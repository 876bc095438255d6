pub mod fixtures;

pub use fixtures::{CollectingServer, closed_port, collecting_server};

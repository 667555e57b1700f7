pub mod config;
pub mod core_room;
pub mod logging;
pub mod metrics;

pub use config::Config;
pub use core_room::{PerformPeekRequest, PerformPeekResponse, RoomPeeker};
pub use logging::{init_logging, LogLevel};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        // Ensure the main exports are accessible
        let _ = LogLevel::Info;
        let _ = Config::default();
    }
}

use crate::core::config::data::{home_relative, Config};

impl Config {
    pub fn print_all(&self) {
        println!("Current configuration:");
        println!(
            "  storage-dir: {}",
            home_relative(self.resolved_storage_dir())
        );
        match self.storage_quota_bytes {
            Some(bytes) => println!("  storage-quota: {bytes} bytes"),
            None => println!("  storage-quota: (unlimited)"),
        }
        println!(
            "  rate-limit: {} requests per {}s",
            self.rate_limit.max_requests, self.rate_limit.time_window_secs
        );
        println!(
            "  logs: keep {} entries for {} days",
            self.logs.max_logs, self.logs.retention_days
        );
        if self.personas.is_empty() {
            println!("  personas: (built-in)");
        } else {
            println!("  personas:");
            for persona in &self.personas {
                println!(
                    "    {} ({})",
                    persona.display_name(),
                    persona.chat_length().as_str()
                );
            }
        }
    }
}

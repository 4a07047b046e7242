use super::diagnostics::NoMansLandPolicy;
use crate::generate::GenerateOptions;
use std::path::PathBuf;
use std::time::Duration;

/// Proxy configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Wrapped language server command
    pub server_command: String,
    pub server_args: Vec<String>,
    /// Passed to gopls as `-logfile`
    pub server_log: Option<PathBuf>,
    /// Passed to gopls as `-rpc.trace`
    pub server_rpc_trace: bool,
    /// Delay between an edit and regeneration
    pub debounce: Duration,
    /// How long the wrapped server may take to answer initialize
    pub startup_timeout: Duration,
    /// How long a request waits for its document to regenerate
    pub sync_timeout: Duration,
    /// Restarts allowed after the wrapped server dies
    pub max_restarts: u32,
    pub no_mans_land: NoMansLandPolicy,
    pub generate: GenerateOptions,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            server_command: "gopls".to_string(),
            server_args: Vec::new(),
            server_log: None,
            server_rpc_trace: false,
            debounce: Duration::from_millis(50),
            startup_timeout: Duration::from_secs(10),
            sync_timeout: Duration::from_secs(2),
            max_restarts: 3,
            no_mans_land: NoMansLandPolicy::default(),
            generate: GenerateOptions {
                include_version: false,
                ..GenerateOptions::default()
            },
        }
    }
}

impl ProxyConfig {
    /// Full argument list for the wrapped server
    pub fn command_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(log) = &self.server_log {
            args.push("-logfile".to_string());
            args.push(log.display().to_string());
        }
        if self.server_rpc_trace {
            args.push("-rpc.trace".to_string());
        }
        args.extend(self.server_args.iter().cloned());
        args
    }
}

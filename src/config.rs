use std::env;

const DEFAULT_EXECUTABLE: &str = "dumpcap";

/// Token passed with `-Z` telling dumpcap where to write sync-pipe frames.
/// "none" makes it use stderr; Windows builds expect a named pipe instead.
const DEFAULT_PIPE_NAME: &str = "none";

/// Environment variable overriding the dumpcap executable.
pub const EXECUTABLE_ENV: &str = "DUMPCAP_EXECUTABLE";

/// Environment variable overriding the sync-pipe token.
pub const PIPE_NAME_ENV: &str = "DUMPCAP_PIPE_NAME";

/// How to reach dumpcap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpcapConfig {
    /// The name (and possibly full path) of the dumpcap executable
    pub executable: String,
    /// Sync-pipe token forced onto continuous invocations
    pub pipe_name: String,
}

impl Default for DumpcapConfig {
    fn default() -> Self {
        Self {
            executable: DEFAULT_EXECUTABLE.to_string(),
            pipe_name: DEFAULT_PIPE_NAME.to_string(),
        }
    }
}

impl DumpcapConfig {
    /// Defaults, overridden by `DUMPCAP_EXECUTABLE` and `DUMPCAP_PIPE_NAME`
    /// when they are set to non-empty values.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(val) = non_empty_var(EXECUTABLE_ENV) {
            config.executable = val;
        }
        if let Some(val) = non_empty_var(PIPE_NAME_ENV) {
            config.pipe_name = val;
        }

        config
    }

    pub fn with_executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = executable.into();
        self
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

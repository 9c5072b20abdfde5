use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Options for launching a new Chrome/Chromium instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchOptions {
    /// Run without a visible window
    pub headless: bool,

    pub window_width: u32,

    pub window_height: u32,

    /// Path to the Chrome binary; auto-detected when unset
    pub chrome_path: Option<PathBuf>,

    /// Persistent profile directory
    pub user_data_dir: Option<PathBuf>,

    /// Chrome sandbox; containers usually need it off
    pub sandbox: bool,

    /// User agent override applied to the tab after launch
    pub user_agent: Option<String>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            chrome_path: None,
            user_data_dir: None,
            sandbox: false,
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
        }
    }
}

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

impl LaunchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn window_size(mut self, width: u32, height: u32) -> Self {
        self.window_width = width;
        self.window_height = height;
        self
    }

    pub fn chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chrome_path = Some(path.into());
        self
    }

    pub fn user_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_data_dir = Some(dir.into());
        self
    }

    pub fn sandbox(mut self, sandbox: bool) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// Options for attaching to an already running browser
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// DevTools WebSocket URL, e.g. `ws://127.0.0.1:9222/devtools/browser/<id>`
    pub ws_url: String,

    /// Default element/navigation timeout in milliseconds
    pub timeout: u64,
}

impl ConnectionOptions {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self { ws_url: ws_url.into(), timeout: 30_000 }
    }

    pub fn timeout(mut self, timeout: u64) -> Self {
        self.timeout = timeout;
        self
    }
}

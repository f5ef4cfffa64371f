//! Client origin collection
//!
//! [`HostEnvironment`] is the default [`IClientEnvironment`]: the host sets
//! the current route and signed-in user as they change, and the tracker
//! copies them into each entry at capture time. The default user agent is
//! built from non-identifying system information (never hostname or
//! username).

use std::sync::RwLock;

use shoptrace_core::{domain::ClientOrigin, ports::IClientEnvironment};

/// Settable client environment shared between the host and the tracker
pub struct HostEnvironment {
    origin: RwLock<ClientOrigin>,
    actor: RwLock<Option<String>>,
}

impl HostEnvironment {
    /// Environment with the default user agent and an empty URL
    pub fn new() -> Self {
        Self::with_origin(ClientOrigin::new(default_user_agent(), String::new()))
    }

    pub fn with_origin(origin: ClientOrigin) -> Self {
        Self {
            origin: RwLock::new(origin),
            actor: RwLock::new(None),
        }
    }

    /// Updates the current route/URL
    pub fn set_url(&self, url: impl Into<String>) {
        let mut origin = self.origin.write().unwrap_or_else(|e| e.into_inner());
        origin.url = url.into();
    }

    pub fn set_user_agent(&self, user_agent: impl Into<String>) {
        let mut origin = self.origin.write().unwrap_or_else(|e| e.into_inner());
        origin.user_agent = user_agent.into();
    }

    /// Sets or clears the signed-in user
    pub fn set_actor(&self, actor_id: Option<String>) {
        *self.actor.write().unwrap_or_else(|e| e.into_inner()) = actor_id;
    }
}

impl Default for HostEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl IClientEnvironment for HostEnvironment {
    fn origin(&self) -> ClientOrigin {
        self.origin.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn current_actor(&self) -> Option<String> {
        self.actor.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// `shoptrace/<version> (<os> <kernel>; <arch>)`
pub fn default_user_agent() -> String {
    let kernel = read_kernel_version();
    let os = if kernel.is_empty() {
        std::env::consts::OS.to_string()
    } else {
        format!("{} {}", std::env::consts::OS, kernel)
    };
    format!(
        "shoptrace/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        os,
        std::env::consts::ARCH
    )
}

fn read_kernel_version() -> String {
    std::fs::read_to_string("/proc/version")
        .ok()
        .and_then(|v| v.split_whitespace().nth(2).map(String::from))
        .unwrap_or_default()
}

//! Registry configuration

/// When the service announces the active-user count
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BroadcastPolicy {
    /// Only when the distinct-user count actually changes
    #[default]
    OnChange,
    /// After every identify and every released claim, changed or not
    EveryIdentify,
}

/// Presence registry configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Broadcast policy applied by the presence service
    pub broadcast_policy: BroadcastPolicy,

    /// Capacity of the service's command channel
    pub command_buffer: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            broadcast_policy: BroadcastPolicy::OnChange,
            command_buffer: 1024,
        }
    }
}

impl RegistryConfig {
    /// Set the broadcast policy
    pub fn broadcast_policy(mut self, policy: BroadcastPolicy) -> Self {
        self.broadcast_policy = policy;
        self
    }

    /// Set the command channel capacity (at least 1)
    pub fn command_buffer(mut self, capacity: usize) -> Self {
        self.command_buffer = capacity.max(1);
        self
    }
}

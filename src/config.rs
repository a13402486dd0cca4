use std::path::PathBuf;

/// Everything an `Instance` needs from its environment, collected into one
/// explicit struct rather than read from process-wide globals (§9 "make
/// them explicit parameters of an InstanceContext"; §6 "Environment
/// (consumer-supplied): commServerUrl, instance directory, listener
/// host/port for direct mode").
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    pub instance_dir: PathBuf,
    pub comm_server_url: Option<String>,
    pub listen_host: String,
    pub listen_port: u16,
}

impl InstanceConfig {
    pub fn new(instance_dir: impl Into<PathBuf>) -> Self {
        Self {
            instance_dir: instance_dir.into(),
            comm_server_url: None,
            listen_host: "127.0.0.1".to_string(),
            listen_port: 0,
        }
    }

    pub fn with_comm_server_url(mut self, url: impl Into<String>) -> Self {
        self.comm_server_url = Some(url.into());
        self
    }

    pub fn with_listener(mut self, host: impl Into<String>, port: u16) -> Self {
        self.listen_host = host.into();
        self.listen_port = port;
        self
    }

    pub fn direct_endpoint(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }
}

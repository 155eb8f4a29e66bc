//! Agent abstraction and the role registry.
//!
//! The [`Agent`] trait decouples the mission controller from how an agent runs.
//! [`ProcessAgent`] spawns an external program through the invoker; tests register
//! scripted in-process agents instead.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::debug;

use crate::core::envelope::Envelope;
use crate::error::{MissionError, Result};
use crate::io::config::MissionConfig;
use crate::io::invoker::{AgentInvocation, InvokeOptions, invoke};

/// Flag passed to network-capable agents when certificate checks are disabled.
pub const NO_VERIFY_TLS_FLAG: &str = "--no-verify-tls";

/// Something that can perform a step and report an envelope.
pub trait Agent {
    fn invoke(&self, arguments: &[String]) -> Result<Envelope>;
}

impl<A: Agent + ?Sized> Agent for &A {
    fn invoke(&self, arguments: &[String]) -> Result<Envelope> {
        (**self).invoke(arguments)
    }
}

/// Transport settings threaded into network-capable agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportOptions {
    pub verify_certificates: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            verify_certificates: true,
        }
    }
}

/// How to launch the agent for one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSpec {
    pub role: String,
    pub entrypoint: Vec<String>,
    /// Appended after the step arguments.
    pub args: Vec<String>,
    pub timeout: Duration,
    pub network: bool,
}

/// Agent backed by an external program.
#[derive(Debug, Clone)]
pub struct ProcessAgent {
    spec: AgentSpec,
    options: InvokeOptions,
    transport: TransportOptions,
}

impl ProcessAgent {
    pub fn new(spec: AgentSpec, options: InvokeOptions, transport: TransportOptions) -> Self {
        Self {
            spec,
            options,
            transport,
        }
    }

    pub fn invocation(&self, arguments: &[String]) -> AgentInvocation {
        let mut all_args = arguments.to_vec();
        all_args.extend(self.spec.args.iter().cloned());
        if self.spec.network && !self.transport.verify_certificates {
            all_args.push(NO_VERIFY_TLS_FLAG.to_string());
        }
        AgentInvocation {
            role: self.spec.role.clone(),
            entrypoint: self.spec.entrypoint.clone(),
            arguments: all_args,
            timeout: self.spec.timeout,
        }
    }
}

impl Agent for ProcessAgent {
    fn invoke(&self, arguments: &[String]) -> Result<Envelope> {
        invoke(&self.invocation(arguments), &self.options)
    }
}

/// Role → agent lookup used by the controller.
#[derive(Default)]
pub struct AgentRegistry<'a> {
    agents: BTreeMap<String, Box<dyn Agent + 'a>>,
}

impl<'a> AgentRegistry<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the agent for `role`.
    pub fn register(&mut self, role: impl Into<String>, agent: impl Agent + 'a) {
        self.agents.insert(role.into(), Box::new(agent));
    }

    pub fn get(&self, role: &str) -> Result<&(dyn Agent + 'a)> {
        self.agents
            .get(role)
            .map(|agent| agent.as_ref())
            .ok_or_else(|| MissionError::UnknownRole(role.to_string()))
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.agents.keys().map(String::as_str)
    }

    /// One [`ProcessAgent`] per configured role.
    pub fn from_config(cfg: &MissionConfig, transport: TransportOptions) -> Self {
        let options = InvokeOptions {
            output_limit_bytes: cfg.output_limit_bytes,
            forward_stderr: cfg.forward_agent_stderr,
        };
        let mut registry = Self::new();
        for (role, agent) in &cfg.agents {
            let spec = AgentSpec {
                role: role.clone(),
                entrypoint: agent.command.clone(),
                args: agent.args.clone(),
                timeout: cfg.timeout_for(agent),
                network: agent.network,
            };
            debug!(role = %role, entrypoint = ?spec.entrypoint, "registering agent");
            registry.register(role.clone(), ProcessAgent::new(spec, options, transport));
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixed;

    impl Agent for Fixed {
        fn invoke(&self, arguments: &[String]) -> Result<Envelope> {
            Ok(Envelope::success(json!({ "args": arguments })))
        }
    }

    fn spec(network: bool) -> AgentSpec {
        AgentSpec {
            role: "recon".to_string(),
            entrypoint: vec!["python3".to_string(), "recon.py".to_string()],
            args: vec!["--ports".to_string(), "80,443".to_string()],
            timeout: Duration::from_secs(30),
            network,
        }
    }

    #[test]
    fn invocation_appends_configured_args_after_step_args() {
        let agent = ProcessAgent::new(
            spec(true),
            InvokeOptions::default(),
            TransportOptions::default(),
        );
        let invocation = agent.invocation(&["example.com".to_string()]);
        assert_eq!(invocation.entrypoint, vec!["python3", "recon.py"]);
        assert_eq!(invocation.arguments, vec!["example.com", "--ports", "80,443"]);
        assert_eq!(invocation.timeout, Duration::from_secs(30));
    }

    #[test]
    fn insecure_transport_only_reaches_network_agents() {
        let insecure = TransportOptions {
            verify_certificates: false,
        };
        let network = ProcessAgent::new(spec(true), InvokeOptions::default(), insecure);
        let offline = ProcessAgent::new(spec(false), InvokeOptions::default(), insecure);

        let args = ["example.com".to_string()];
        assert_eq!(
            network.invocation(&args).arguments.last().map(String::as_str),
            Some(NO_VERIFY_TLS_FLAG)
        );
        assert!(
            !offline
                .invocation(&args)
                .arguments
                .iter()
                .any(|arg| arg == NO_VERIFY_TLS_FLAG)
        );
    }

    #[test]
    fn registry_resolves_roles_and_rejects_unknown() {
        let fixed = Fixed;
        let mut registry = AgentRegistry::new();
        registry.register("recon", &fixed);

        let envelope = registry
            .get("recon")
            .expect("registered")
            .invoke(&["t".to_string()])
            .expect("invoke");
        assert!(envelope.is_success());

        let err = registry.get("exploit").err().expect("unknown role");
        assert!(matches!(err, MissionError::UnknownRole(role) if role == "exploit"));
    }

    #[test]
    fn registry_from_default_config_has_both_roles() {
        let registry =
            AgentRegistry::from_config(&MissionConfig::default(), TransportOptions::default());
        assert_eq!(registry.roles().collect::<Vec<_>>(), vec!["analyze", "recon"]);
    }
}

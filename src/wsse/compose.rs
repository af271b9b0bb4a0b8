//! Composite security plugin.

use crate::envelope::Envelope;
use crate::error::SoapError;
use crate::plugin::{BindingOptions, HookSet, Operation, Plugin};
use crate::transport::HttpHeaders;

/// Runs a fixed ordered list of plugins in sequence within a single hook
/// call, exposing the single-plugin contract to the pipeline. Nesting is
/// transparent: a `Compose` may contain another `Compose`.
pub struct Compose {
    plugins: Vec<Box<dyn Plugin>>,
}

impl Compose {
    pub fn new(plugins: Vec<Box<dyn Plugin>>) -> Self {
        Self { plugins }
    }
}

impl Plugin for Compose {
    fn hooks(&self) -> HookSet {
        self.plugins
            .iter()
            .fold(
                HookSet {
                    egress: false,
                    ingress: false,
                },
                |hooks, plugin| hooks.union(plugin.hooks()),
            )
    }

    fn name(&self) -> &str {
        "wsse-compose"
    }

    fn egress(
        &self,
        mut envelope: Envelope,
        mut http_headers: HttpHeaders,
        operation: &Operation,
        binding_options: &BindingOptions,
    ) -> Result<(Envelope, HttpHeaders), SoapError> {
        for plugin in &self.plugins {
            if !plugin.hooks().egress {
                continue;
            }
            (envelope, http_headers) =
                plugin.egress(envelope, http_headers, operation, binding_options)?;
        }
        Ok((envelope, http_headers))
    }

    fn ingress(
        &self,
        mut envelope: Envelope,
        mut http_headers: HttpHeaders,
        operation: &Operation,
    ) -> Result<(Envelope, HttpHeaders), SoapError> {
        for plugin in &self.plugins {
            if !plugin.hooks().ingress {
                continue;
            }
            (envelope, http_headers) = plugin.ingress(envelope, http_headers, operation)?;
        }
        Ok((envelope, http_headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::WSSE_NS;
    use crate::wsse::username::{PasswordType, UsernameToken};
    use crate::wsse::Signature;
    use crate::xml::QName;

    #[test]
    fn test_compose_runs_sub_plugins_in_order() {
        let compose = Compose::new(vec![
            Box::new(
                UsernameToken::new("alice", "secret")
                    .with_password_type(PasswordType::PasswordText),
            ),
            Box::new(Signature::with_memory_key(b"key".to_vec())),
        ]);

        let (envelope, _) = compose
            .egress(
                Envelope::new(),
                HttpHeaders::new(),
                &Operation::new("Op"),
                &BindingOptions::new("https://svc/endpoint"),
            )
            .unwrap();

        let security = envelope
            .header()
            .unwrap()
            .find_child(&QName::new(WSSE_NS, "Security"))
            .unwrap();
        let children: Vec<&str> = security
            .child_elements()
            .map(|e| e.name.local.as_str())
            .collect();
        assert_eq!(children, vec!["UsernameToken", "Signature"]);
    }

    #[test]
    fn test_compose_declares_union_of_hooks() {
        let compose = Compose::new(vec![Box::new(
            UsernameToken::new("alice", "secret").with_password_type(PasswordType::PasswordText),
        )]);
        let hooks = compose.hooks();
        assert!(hooks.egress);
        assert!(!hooks.ingress);
    }

    #[test]
    fn test_empty_compose_is_a_no_op() {
        let compose = Compose::new(Vec::new());
        let envelope = Envelope::new();
        let (out, _) = compose
            .egress(
                envelope.clone(),
                HttpHeaders::new(),
                &Operation::new("Op"),
                &BindingOptions::new("https://svc/endpoint"),
            )
            .unwrap();
        assert_eq!(out, envelope);
    }
}

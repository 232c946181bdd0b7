//! Tracing subscriber setup for hosts embedding the core
//!
//! Nothing in the crate logs plaintext, identifiers, or key material, so the
//! subscriber needs no redaction layer.

use tracing_subscriber::EnvFilter;

/// Default filter directive when `RUST_LOG` is unset
pub const DEFAULT_DIRECTIVE: &str = "carevault_core=info";

/// Install a global fmt subscriber filtered by `RUST_LOG` plus `default_directive`
///
/// Returns an error if the directive does not parse or a global subscriber is
/// already installed.
pub fn init_tracing(default_directive: &str) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_directive.parse()?))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_directive_rejected() {
        assert!(init_tracing("carevault_core=loudest").is_err());
    }

    #[test]
    fn test_second_install_fails() {
        // Either this call or another test's installed the subscriber first
        let _ = init_tracing(DEFAULT_DIRECTIVE);
        assert!(init_tracing(DEFAULT_DIRECTIVE).is_err());
    }
}

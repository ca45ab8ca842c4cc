//! Capability registration for session negotiation.
//!
//! Encoder, pseudo-encoding and client-message capabilities are
//! registered against (code, vendor, signature) tuples at startup.
//! Actual enablement for a session is the client's `SetEncodings` list
//! intersected with what the server registered.

/// One registered capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    pub code: i32,
    pub vendor: &'static str,
    pub signature: &'static str,
}

/// Registry of everything the server offers to a session.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    encodings: Vec<Capability>,
    client_messages: Vec<Capability>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_encoding(&mut self, code: i32, vendor: &'static str, signature: &'static str) {
        self.encodings.push(Capability {
            code,
            vendor,
            signature,
        });
    }

    pub fn add_client_message(&mut self, code: i32, vendor: &'static str, signature: &'static str) {
        self.client_messages.push(Capability {
            code,
            vendor,
            signature,
        });
    }

    pub fn encodings(&self) -> &[Capability] {
        &self.encodings
    }

    pub fn client_messages(&self) -> &[Capability] {
        &self.client_messages
    }

    pub fn encoding_registered(&self, code: i32) -> bool {
        self.encodings.iter().any(|c| c.code == code)
    }

    /// The requested codes the server actually registered, in the
    /// client's preference order.
    pub fn enabled(&self, requested: &[i32]) -> Vec<i32> {
        requested
            .iter()
            .copied()
            .filter(|code| self.encoding_registered(*code))
            .collect()
    }
}

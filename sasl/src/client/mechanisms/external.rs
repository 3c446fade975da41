//! Provides the SASL "EXTERNAL" mechanism.

use crate::client::{Mechanism, MechanismError};
use crate::common::{Credentials, ExchangeState};

/// A struct for the SASL EXTERNAL mechanism.
///
/// The identity is asserted by the TLS client certificate; the only thing
/// sent on the wire is the optional authorization identity.
pub struct External {
    authzid: Option<String>,
    state: ExchangeState,
}

impl External {
    /// Constructs a new struct for authenticating using the SASL EXTERNAL mechanism.
    #[allow(clippy::new_without_default)]
    pub fn new() -> External {
        External {
            authzid: None,
            state: ExchangeState::NotStarted,
        }
    }
}

impl Mechanism for External {
    fn name(&self) -> &str {
        "EXTERNAL"
    }

    fn from_credentials(credentials: Credentials) -> Result<External, MechanismError> {
        Ok(External {
            authzid: credentials.authzid,
            state: ExchangeState::NotStarted,
        })
    }

    fn initial(&mut self) -> Option<Vec<u8>> {
        self.state = ExchangeState::InitialSent;
        Some(
            self.authzid
                .as_ref()
                .map(|authzid| authzid.as_bytes().to_vec())
                .unwrap_or_default(),
        )
    }

    fn response(&mut self, challenge: &[u8]) -> Result<Vec<u8>, MechanismError> {
        // Servers that don't accept a zero-length initial response send an
        // empty challenge instead, which is answered with the empty authzid.
        if self.state == ExchangeState::InitialSent && challenge.is_empty() {
            self.state = ExchangeState::ChallengeProcessed;
            return Ok(Vec::new());
        }
        self.state = ExchangeState::Failed;
        Err(MechanismError::UnexpectedCall(self.state))
    }

    fn success(&mut self, _data: &[u8]) -> Result<(), MechanismError> {
        self.state = ExchangeState::Completed;
        Ok(())
    }

    fn state(&self) -> ExchangeState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_initial() {
        let mut mech = External::new();
        assert_eq!(mech.initial(), Some(Vec::new()));
        assert_eq!(mech.state(), ExchangeState::InitialSent);
    }

    #[test]
    fn authzid_initial() {
        let creds = Credentials::default().with_authzid("juliet@example.com");
        let mut mech = External::from_credentials(creds).unwrap();
        assert_eq!(mech.initial(), Some(b"juliet@example.com".to_vec()));
        mech.success(b"").unwrap();
        assert_eq!(mech.state(), ExchangeState::Completed);
    }

    #[test]
    fn only_one_empty_challenge() {
        let mut mech = External::new();
        mech.initial();
        assert_eq!(mech.response(b"").unwrap(), Vec::<u8>::new());
        assert!(mech.response(b"").is_err());
        assert_eq!(mech.state(), ExchangeState::Failed);
    }
}

//! Provides the SASL "PLAIN" mechanism.

use crate::client::{Mechanism, MechanismError};
use crate::common::{Credentials, ExchangeState, Identity, Secret};

/// A struct for the SASL PLAIN mechanism.
pub struct Plain {
    authzid: Option<String>,
    username: String,
    password: String,
    state: ExchangeState,
}

impl Plain {
    /// Constructs a new struct for authenticating using the SASL PLAIN mechanism.
    ///
    /// It is recommended that instead you use a `Credentials` struct and turn it into the
    /// requested mechanism using `from_credentials`.
    pub fn new<N: Into<String>, P: Into<String>>(username: N, password: P) -> Plain {
        Plain {
            authzid: None,
            username: username.into(),
            password: password.into(),
            state: ExchangeState::NotStarted,
        }
    }
}

impl Mechanism for Plain {
    fn name(&self) -> &str {
        "PLAIN"
    }

    fn from_credentials(credentials: Credentials) -> Result<Plain, MechanismError> {
        match (credentials.identity, credentials.secret) {
            (Identity::Username(username), Secret::Password(password)) => {
                let mut plain = Plain::new(username, password);
                plain.authzid = credentials.authzid;
                Ok(plain)
            }
            _ => Err(MechanismError::PlainRequiresUsernameAndPassword),
        }
    }

    fn initial(&mut self) -> Option<Vec<u8>> {
        let mut auth = Vec::new();
        if let Some(ref authzid) = self.authzid {
            auth.extend(authzid.bytes());
        }
        auth.push(0);
        auth.extend(self.username.bytes());
        auth.push(0);
        auth.extend(self.password.bytes());
        self.state = ExchangeState::InitialSent;
        Some(auth)
    }

    fn success(&mut self, data: &[u8]) -> Result<(), MechanismError> {
        if self.state != ExchangeState::InitialSent || !data.is_empty() {
            self.state = ExchangeState::Failed;
            return Err(MechanismError::UnexpectedCall(self.state));
        }
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
    fn with_authzid() {
        let creds = Credentials::default()
            .with_username("juliet")
            .with_password("r0m30")
            .with_authzid("romeo@example.net");
        let mut mech = Plain::from_credentials(creds).unwrap();
        assert_eq!(
            mech.initial().unwrap(),
            b"romeo@example.net\0juliet\0r0m30".to_vec()
        );
        mech.success(b"").unwrap();
        assert_eq!(mech.state(), ExchangeState::Completed);
    }

    #[test]
    fn challenge_is_rejected() {
        let mut mech = Plain::new("juliet", "r0m30");
        mech.initial();
        assert!(mech.response(b"more please").is_err());
    }

    #[test]
    fn requires_password() {
        let creds = Credentials::default().with_username("juliet");
        assert_eq!(
            Plain::from_credentials(creds).err(),
            Some(MechanismError::PlainRequiresUsernameAndPassword)
        );
    }
}

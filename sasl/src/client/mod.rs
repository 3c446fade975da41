//! The client side of SASL.

use std::fmt;

use crate::common::{Credentials, ExchangeState};

pub mod mechanisms;

/// Errors a mechanism may raise while authenticating.
#[derive(Debug, PartialEq, Eq)]
pub enum MechanismError {
    /// PLAIN needs a username and a password.
    PlainRequiresUsernameAndPassword,
    /// SCRAM needs a username and a password.
    ScramRequiresUsernameAndPassword,
    /// `-PLUS` was requested but the channel has no binding data.
    ChannelBindingUnavailable,
    /// SASLprep rejected the username or password.
    SaslPrep,
    /// The random number generator failed.
    CannotGenerateNonce,
    /// The server's challenge was not a valid frame.
    CannotDecodeChallenge,
    /// The server's challenge has no nonce.
    NoServerNonce,
    /// The server's nonce does not extend the client nonce.
    InvalidServerNonce,
    /// The server's challenge has no salt.
    NoServerSalt,
    /// The server's challenge has no, or an invalid, iteration count.
    NoServerIterations,
    /// The server requested a mandatory extension we don't know.
    UnsupportedExtension,
    /// The key derivation failed.
    InvalidKeyLength,
    /// The server's final message carries no signature.
    NoServerSignature,
    /// The server's signature doesn't match the expected one.
    InvalidServerSignature,
    /// The server reported an error (`e=`) in its final message.
    ServerError(String),
    /// The mechanism was driven out of order.
    UnexpectedCall(ExchangeState),
}

impl fmt::Display for MechanismError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MechanismError::PlainRequiresUsernameAndPassword => {
                write!(fmt, "PLAIN requires a username and a password")
            }
            MechanismError::ScramRequiresUsernameAndPassword => {
                write!(fmt, "SCRAM requires a username and a password")
            }
            MechanismError::ChannelBindingUnavailable => {
                write!(fmt, "channel binding requested but no binding data available")
            }
            MechanismError::SaslPrep => write!(fmt, "SASLprep rejected the credentials"),
            MechanismError::CannotGenerateNonce => write!(fmt, "can't generate nonce"),
            MechanismError::CannotDecodeChallenge => write!(fmt, "can't decode challenge"),
            MechanismError::NoServerNonce => write!(fmt, "no server nonce"),
            MechanismError::InvalidServerNonce => {
                write!(fmt, "server nonce doesn't start with the client nonce")
            }
            MechanismError::NoServerSalt => write!(fmt, "no server salt"),
            MechanismError::NoServerIterations => write!(fmt, "no server iterations"),
            MechanismError::UnsupportedExtension => {
                write!(fmt, "server requires an unsupported extension")
            }
            MechanismError::InvalidKeyLength => write!(fmt, "invalid key length"),
            MechanismError::NoServerSignature => write!(fmt, "no server signature"),
            MechanismError::InvalidServerSignature => write!(fmt, "invalid server signature"),
            MechanismError::ServerError(e) => write!(fmt, "server error: {}", e),
            MechanismError::UnexpectedCall(state) => {
                write!(fmt, "mechanism called out of order in state {:?}", state)
            }
        }
    }
}

impl std::error::Error for MechanismError {}

/// A SASL mechanism, on the client side.
pub trait Mechanism {
    /// The name of the mechanism, as advertised in `<mechanisms/>`.
    fn name(&self) -> &str;

    /// Creates the mechanism from credentials.
    fn from_credentials(credentials: Credentials) -> Result<Self, MechanismError>
    where
        Self: Sized;

    /// The initial response, if the mechanism has one.
    ///
    /// `Some(vec![])` is a zero-length initial response, which differs from
    /// having none at all.
    fn initial(&mut self) -> Option<Vec<u8>>;

    /// Answers a server challenge.
    fn response(&mut self, challenge: &[u8]) -> Result<Vec<u8>, MechanismError> {
        let _ = challenge;
        Err(MechanismError::UnexpectedCall(self.state()))
    }

    /// Verifies the additional data of the server's success message.
    fn success(&mut self, data: &[u8]) -> Result<(), MechanismError> {
        let _ = data;
        Ok(())
    }

    /// The current position in the exchange.
    fn state(&self) -> ExchangeState;
}

//! SASL mechanism preference and selection.

use sasl::client::mechanisms::{External, Plain, Scram};
use sasl::client::{Mechanism, MechanismError};
use sasl::common::scram::ScramHash;
use sasl::common::{ChannelBinding, Credentials};

/// The SASL mechanisms this crate can negotiate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MechanismKind {
    /// `EXTERNAL`, via a TLS client certificate
    External,
    /// `SCRAM-SHA-512-PLUS`
    ScramSha512Plus,
    /// `SCRAM-SHA-256-PLUS`
    ScramSha256Plus,
    /// `SCRAM-SHA-1-PLUS`
    ScramSha1Plus,
    /// `SCRAM-SHA-512`
    ScramSha512,
    /// `SCRAM-SHA-256`
    ScramSha256,
    /// `SCRAM-SHA-1`
    ScramSha1,
    /// `PLAIN`
    Plain,
}

impl MechanismKind {
    /// Default order, most preferred first.
    ///
    /// EXTERNAL only qualifies on a TLS stream that presented a client
    /// certificate, so listing it first does not shadow the password
    /// mechanisms.
    pub const DEFAULT_PREFERENCE: &'static [MechanismKind] = &[
        MechanismKind::External,
        MechanismKind::ScramSha512Plus,
        MechanismKind::ScramSha256Plus,
        MechanismKind::ScramSha1Plus,
        MechanismKind::ScramSha512,
        MechanismKind::ScramSha256,
        MechanismKind::ScramSha1,
        MechanismKind::Plain,
    ];

    /// The IANA registered name.
    pub fn name(self) -> &'static str {
        match self {
            MechanismKind::External => "EXTERNAL",
            MechanismKind::ScramSha512Plus => "SCRAM-SHA-512-PLUS",
            MechanismKind::ScramSha256Plus => "SCRAM-SHA-256-PLUS",
            MechanismKind::ScramSha1Plus => "SCRAM-SHA-1-PLUS",
            MechanismKind::ScramSha512 => "SCRAM-SHA-512",
            MechanismKind::ScramSha256 => "SCRAM-SHA-256",
            MechanismKind::ScramSha1 => "SCRAM-SHA-1",
            MechanismKind::Plain => "PLAIN",
        }
    }

    fn scram(self) -> Option<(ScramHash, bool)> {
        match self {
            MechanismKind::ScramSha512Plus => Some((ScramHash::Sha512, true)),
            MechanismKind::ScramSha256Plus => Some((ScramHash::Sha256, true)),
            MechanismKind::ScramSha1Plus => Some((ScramHash::Sha1, true)),
            MechanismKind::ScramSha512 => Some((ScramHash::Sha512, false)),
            MechanismKind::ScramSha256 => Some((ScramHash::Sha256, false)),
            MechanismKind::ScramSha1 => Some((ScramHash::Sha1, false)),
            MechanismKind::External | MechanismKind::Plain => None,
        }
    }

    fn plus_sibling(self) -> Option<MechanismKind> {
        match self {
            MechanismKind::ScramSha512 => Some(MechanismKind::ScramSha512Plus),
            MechanismKind::ScramSha256 => Some(MechanismKind::ScramSha256Plus),
            MechanismKind::ScramSha1 => Some(MechanismKind::ScramSha1Plus),
            _ => None,
        }
    }

    /// Instantiate a fresh mechanism for one authentication attempt.
    pub(crate) fn instantiate(
        self,
        credentials: Credentials,
    ) -> Result<Box<dyn Mechanism + Send>, MechanismError> {
        Ok(match self.scram() {
            Some((hash, plus)) => {
                let available = credentials.channel_binding.is_available();
                let binding = match (plus, available) {
                    (true, true) => credentials.channel_binding.clone(),
                    (true, false) => return Err(MechanismError::ChannelBindingUnavailable),
                    (false, true) => ChannelBinding::Unsupported,
                    (false, false) => ChannelBinding::None,
                };
                Box::new(Scram::from_credentials_with_hash(
                    hash,
                    credentials.with_channel_binding(binding),
                )?)
            }
            None if self == MechanismKind::External => {
                Box::new(External::from_credentials(credentials)?)
            }
            None => Box::new(Plain::from_credentials(credentials)?),
        })
    }
}

/// What is known about the connection when choosing a mechanism.
pub(crate) struct Selection<'a> {
    pub offered: &'a [String],
    pub channel_binding: bool,
    pub password: bool,
    pub external: bool,
    pub plaintext_allowed: bool,
}

impl Selection<'_> {
    fn is_offered(&self, kind: MechanismKind) -> bool {
        self.offered.iter().any(|name| name == kind.name())
    }

    fn is_eligible(&self, kind: MechanismKind) -> bool {
        if !self.is_offered(kind) {
            return false;
        }
        match kind {
            MechanismKind::External => self.external,
            MechanismKind::Plain => self.password && self.plaintext_allowed,
            kind => match kind.scram() {
                Some((_, true)) => self.password && self.channel_binding,
                _ => {
                    // Offering the PLUS sibling while we hold binding data
                    // means the non-PLUS variant would be a downgrade.
                    let downgrade = self.channel_binding
                        && kind.plus_sibling().is_some_and(|plus| self.is_offered(plus));
                    self.password && !downgrade
                }
            },
        }
    }

    /// The first eligible mechanism in `preference` order.
    pub fn select(&self, preference: &[MechanismKind]) -> Option<MechanismKind> {
        preference
            .iter()
            .copied()
            .find(|kind| self.is_eligible(*kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offered(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn plus_preferred_with_binding() {
        let offered = offered(&["SCRAM-SHA-1", "SCRAM-SHA-1-PLUS", "SCRAM-SHA-256", "PLAIN"]);
        let selection = Selection {
            offered: &offered,
            channel_binding: true,
            password: true,
            external: false,
            plaintext_allowed: true,
        };
        assert_eq!(
            selection.select(MechanismKind::DEFAULT_PREFERENCE),
            Some(MechanismKind::ScramSha1Plus)
        );
    }

    #[test]
    fn no_binding_falls_back_to_scram() {
        let offered = offered(&["SCRAM-SHA-1", "SCRAM-SHA-256-PLUS", "SCRAM-SHA-256", "PLAIN"]);
        let selection = Selection {
            offered: &offered,
            channel_binding: false,
            password: true,
            external: false,
            plaintext_allowed: true,
        };
        assert_eq!(
            selection.select(MechanismKind::DEFAULT_PREFERENCE),
            Some(MechanismKind::ScramSha256)
        );
    }

    #[test]
    fn non_plus_refused_when_plus_offered() {
        // The preference list deliberately puts the non-PLUS variant first.
        let offered = offered(&["SCRAM-SHA-256", "SCRAM-SHA-256-PLUS"]);
        let selection = Selection {
            offered: &offered,
            channel_binding: true,
            password: true,
            external: false,
            plaintext_allowed: true,
        };
        assert_eq!(
            selection.select(&[MechanismKind::ScramSha256, MechanismKind::ScramSha256Plus]),
            Some(MechanismKind::ScramSha256Plus)
        );
        assert_eq!(selection.select(&[MechanismKind::ScramSha256]), None);
    }

    #[test]
    fn external_needs_certificate() {
        let offered = offered(&["EXTERNAL", "PLAIN"]);
        let mut selection = Selection {
            offered: &offered,
            channel_binding: false,
            password: true,
            external: false,
            plaintext_allowed: true,
        };
        assert_eq!(
            selection.select(MechanismKind::DEFAULT_PREFERENCE),
            Some(MechanismKind::Plain)
        );
        selection.external = true;
        assert_eq!(
            selection.select(MechanismKind::DEFAULT_PREFERENCE),
            Some(MechanismKind::External)
        );
    }

    #[test]
    fn plain_needs_encryption() {
        let offered = offered(&["PLAIN"]);
        let selection = Selection {
            offered: &offered,
            channel_binding: false,
            password: true,
            external: false,
            plaintext_allowed: false,
        };
        assert_eq!(selection.select(MechanismKind::DEFAULT_PREFERENCE), None);
    }

    #[test]
    fn override_preference() {
        let offered = offered(&["SCRAM-SHA-512", "SCRAM-SHA-1", "PLAIN"]);
        let selection = Selection {
            offered: &offered,
            channel_binding: false,
            password: true,
            external: false,
            plaintext_allowed: true,
        };
        assert_eq!(
            selection.select(&[MechanismKind::ScramSha1, MechanismKind::ScramSha512]),
            Some(MechanismKind::ScramSha1)
        );
    }

    #[test]
    fn instantiate_names() {
        let creds = Credentials::default()
            .with_username("user")
            .with_password("pencil")
            .with_channel_binding(ChannelBinding::TlsExporter(vec![1; 32]));
        let plus = MechanismKind::ScramSha256Plus
            .instantiate(creds.clone())
            .unwrap();
        assert_eq!(plus.name(), "SCRAM-SHA-256-PLUS");
        let mut plain_scram = MechanismKind::ScramSha256.instantiate(creds).unwrap();
        assert_eq!(plain_scram.name(), "SCRAM-SHA-256");
        assert!(plain_scram.initial().unwrap().starts_with(b"y,,"));
        assert!(MechanismKind::ScramSha1Plus
            .instantiate(Credentials::default().with_username("u").with_password("p"))
            .is_err());
    }
}

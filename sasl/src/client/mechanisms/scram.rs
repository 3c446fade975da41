//! Provides the SASL "SCRAM-*" mechanisms and their "-PLUS" variants.

use base64::{engine::general_purpose::STANDARD as Base64, Engine};
use hmac::digest::InvalidLength;

use crate::client::{Mechanism, MechanismError};
use crate::common::scram::{generate_nonce, ScramHash};
use crate::common::{
    parse_frame, xor, ChannelBinding, Credentials, ExchangeState, Identity, Secret,
};

enum ScramState {
    Init,
    SentInitialMessage {
        initial_message: Vec<u8>,
        gs2_header: Vec<u8>,
    },
    GotServerData {
        server_signature: Vec<u8>,
    },
    Done,
    Failed,
}

/// A struct for the SASL SCRAM-* and SCRAM-*-PLUS mechanisms.
pub struct Scram {
    name: String,
    hash: ScramHash,
    username: String,
    password: String,
    authzid: Option<String>,
    client_nonce: String,
    state: ScramState,
    channel_binding: ChannelBinding,
}

impl Scram {
    /// Constructs a new SCRAM mechanism for the given hash.
    ///
    /// Binding data in `channel_binding` turns it into the `-PLUS` variant.
    ///
    /// It is recommended that instead you use a `Credentials` struct and turn it into the
    /// requested mechanism using `from_credentials_with_hash`.
    pub fn new<N: Into<String>, P: Into<String>>(
        hash: ScramHash,
        username: N,
        password: P,
        channel_binding: ChannelBinding,
    ) -> Result<Scram, MechanismError> {
        let nonce = generate_nonce().map_err(|_| MechanismError::CannotGenerateNonce)?;
        Scram::new_with_nonce(hash, username, password, channel_binding, nonce)
    }

    fn new_with_nonce<N: Into<String>, P: Into<String>>(
        hash: ScramHash,
        username: N,
        password: P,
        channel_binding: ChannelBinding,
        client_nonce: String,
    ) -> Result<Scram, MechanismError> {
        let username = stringprep::saslprep(&username.into())
            .map_err(|_| MechanismError::SaslPrep)?
            .into_owned();
        let password = stringprep::saslprep(&password.into())
            .map_err(|_| MechanismError::SaslPrep)?
            .into_owned();
        let name = if channel_binding.is_available() {
            format!("SCRAM-{}-PLUS", hash.name())
        } else {
            format!("SCRAM-{}", hash.name())
        };
        Ok(Scram {
            name,
            hash,
            username,
            password,
            authzid: None,
            client_nonce,
            state: ScramState::Init,
            channel_binding,
        })
    }

    /// Constructs the mechanism from credentials, for the given hash.
    pub fn from_credentials_with_hash(
        hash: ScramHash,
        credentials: Credentials,
    ) -> Result<Scram, MechanismError> {
        match (credentials.identity, credentials.secret) {
            (Identity::Username(username), Secret::Password(password)) => {
                let mut scram =
                    Scram::new(hash, username, password, credentials.channel_binding)?;
                scram.authzid = credentials.authzid;
                Ok(scram)
            }
            _ => Err(MechanismError::ScramRequiresUsernameAndPassword),
        }
    }

    fn gs2_header(&self) -> Vec<u8> {
        let mut header = self.channel_binding.gs2_flag().as_bytes().to_vec();
        header.push(b',');
        if let Some(ref authzid) = self.authzid {
            header.extend(b"a=");
            header.extend(escape(authzid).bytes());
        }
        header.push(b',');
        header
    }

    /// Computes `ClientProof` and the expected `ServerSignature`.
    fn derive_proofs(
        &self,
        salt: &[u8],
        iterations: u32,
        auth_message: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>), InvalidLength> {
        let hash = self.hash;
        let salted_password = hash.derive(self.password.as_bytes(), salt, iterations)?;
        let client_key = hash.hmac(&salted_password, b"Client Key")?;
        let stored_key = hash.hash(&client_key);
        let client_signature = hash.hmac(&stored_key, auth_message)?;
        let client_proof = xor(&client_key, &client_signature);
        let server_key = hash.hmac(&salted_password, b"Server Key")?;
        let server_signature = hash.hmac(&server_key, auth_message)?;
        Ok((client_proof, server_signature))
    }

    fn fail(&mut self, error: MechanismError) -> MechanismError {
        self.state = ScramState::Failed;
        error
    }

    fn verify_server_final(&mut self, data: &[u8]) -> Result<(), MechanismError> {
        let server_signature = match self.state {
            ScramState::GotServerData {
                ref server_signature,
            } => server_signature.clone(),
            _ => return Err(self.fail(MechanismError::UnexpectedCall(self.state()))),
        };
        let frame =
            parse_frame(data).map_err(|_| self.fail(MechanismError::CannotDecodeChallenge))?;
        if let Some(error) = frame.get(&'e') {
            return Err(self.fail(MechanismError::ServerError(error.clone())));
        }
        let signature = frame
            .get(&'v')
            .and_then(|v| Base64.decode(v).ok())
            .ok_or_else(|| self.fail(MechanismError::NoServerSignature))?;
        if signature != server_signature {
            return Err(self.fail(MechanismError::InvalidServerSignature));
        }
        self.state = ScramState::Done;
        Ok(())
    }
}

/// Escapes `,` and `=` in a saslname.
fn escape(name: &str) -> String {
    name.replace('=', "=3D").replace(',', "=2C")
}

impl Mechanism for Scram {
    fn name(&self) -> &str {
        &self.name
    }

    fn from_credentials(credentials: Credentials) -> Result<Scram, MechanismError> {
        Scram::from_credentials_with_hash(ScramHash::Sha256, credentials)
    }

    fn initial(&mut self) -> Option<Vec<u8>> {
        let gs2_header = self.gs2_header();
        let mut bare = Vec::new();
        bare.extend(b"n=");
        bare.extend(escape(&self.username).bytes());
        bare.extend(b",r=");
        bare.extend(self.client_nonce.bytes());
        let mut data = gs2_header.clone();
        data.extend(&bare);
        self.state = ScramState::SentInitialMessage {
            initial_message: bare,
            gs2_header,
        };
        Some(data)
    }

    fn response(&mut self, challenge: &[u8]) -> Result<Vec<u8>, MechanismError> {
        let (initial_message, gs2_header) = match self.state {
            ScramState::SentInitialMessage {
                ref initial_message,
                ref gs2_header,
            } => (initial_message.clone(), gs2_header.clone()),
            ScramState::GotServerData { .. } => {
                // Some servers send the final message as a challenge and
                // expect an empty response before sending a bare success.
                self.verify_server_final(challenge)?;
                return Ok(Vec::new());
            }
            _ => return Err(self.fail(MechanismError::UnexpectedCall(self.state()))),
        };

        let frame =
            parse_frame(challenge).map_err(|_| self.fail(MechanismError::CannotDecodeChallenge))?;
        if frame.contains_key(&'m') {
            return Err(self.fail(MechanismError::UnsupportedExtension));
        }
        let server_nonce = frame
            .get(&'r')
            .ok_or_else(|| self.fail(MechanismError::NoServerNonce))?;
        if !server_nonce.starts_with(&self.client_nonce)
            || server_nonce.len() <= self.client_nonce.len()
        {
            return Err(self.fail(MechanismError::InvalidServerNonce));
        }
        let salt = frame
            .get(&'s')
            .and_then(|s| Base64.decode(s).ok())
            .ok_or_else(|| self.fail(MechanismError::NoServerSalt))?;
        let iterations: u32 = frame
            .get(&'i')
            .and_then(|i| i.parse().ok())
            .filter(|i| *i > 0)
            .ok_or_else(|| self.fail(MechanismError::NoServerIterations))?;

        let mut cb_data = gs2_header;
        cb_data.extend(self.channel_binding.data());

        let mut client_final_message_bare = Vec::new();
        client_final_message_bare.extend(b"c=");
        client_final_message_bare.extend(Base64.encode(&cb_data).bytes());
        client_final_message_bare.extend(b",r=");
        client_final_message_bare.extend(server_nonce.bytes());

        let mut auth_message = Vec::new();
        auth_message.extend(&initial_message);
        auth_message.push(b',');
        auth_message.extend(challenge);
        auth_message.push(b',');
        auth_message.extend(&client_final_message_bare);

        let (client_proof, server_signature) = self
            .derive_proofs(&salt, iterations, &auth_message)
            .map_err(|_| self.fail(MechanismError::InvalidKeyLength))?;

        let mut client_final_message = Vec::new();
        client_final_message.extend(client_final_message_bare);
        client_final_message.extend(b",p=");
        client_final_message.extend(Base64.encode(client_proof).bytes());

        self.state = ScramState::GotServerData { server_signature };
        Ok(client_final_message)
    }

    fn success(&mut self, data: &[u8]) -> Result<(), MechanismError> {
        match self.state {
            ScramState::Done if data.is_empty() => Ok(()),
            _ => self.verify_server_final(data),
        }
    }

    fn state(&self) -> ExchangeState {
        match self.state {
            ScramState::Init => ExchangeState::NotStarted,
            ScramState::SentInitialMessage { .. } => ExchangeState::InitialSent,
            ScramState::GotServerData { .. } => ExchangeState::ChallengeProcessed,
            ScramState::Done => ExchangeState::Completed,
            ScramState::Failed => ExchangeState::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scram_sha1_works() {
        // Source: RFC 5802
        let username = "user";
        let password = "pencil";
        let client_nonce = "fyko+d2lbbFgONRv9qkxdawL";
        let client_init = b"n,,n=user,r=fyko+d2lbbFgONRv9qkxdawL";
        let server_init = b"r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,s=QSXCR+Q6sek8bf92,i=4096";
        let client_final =
            b"c=biws,r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,p=v0X8v3Bz2T0CJGbJQyF0X+HI4Ts=";
        let server_final = b"v=rmF9pqV8S7suAoZWja4dJRkFsKQ=";
        let mut mechanism = Scram::new_with_nonce(
            ScramHash::Sha1,
            username,
            password,
            ChannelBinding::None,
            client_nonce.to_owned(),
        )
        .unwrap();
        assert_eq!(mechanism.name(), "SCRAM-SHA-1");
        let init = mechanism.initial().unwrap();
        assert_eq!(
            String::from_utf8(init.clone()).unwrap(),
            String::from_utf8(client_init[..].to_owned()).unwrap()
        );
        let resp = mechanism.response(&server_init[..]).unwrap();
        assert_eq!(
            String::from_utf8(resp.clone()).unwrap(),
            String::from_utf8(client_final[..].to_owned()).unwrap()
        );
        mechanism.success(&server_final[..]).unwrap();
        assert_eq!(mechanism.state(), ExchangeState::Completed);
    }

    #[test]
    fn scram_sha256_works() {
        // Source: RFC 7677
        let username = "user";
        let password = "pencil";
        let client_nonce = "rOprNGfwEbeRWgbNEkqO";
        let client_init = b"n,,n=user,r=rOprNGfwEbeRWgbNEkqO";
        let server_init = b"r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096";
        let client_final = b"c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,p=dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ=";
        let server_final = b"v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=";
        let mut mechanism = Scram::new_with_nonce(
            ScramHash::Sha256,
            username,
            password,
            ChannelBinding::None,
            client_nonce.to_owned(),
        )
        .unwrap();
        let init = mechanism.initial().unwrap();
        assert_eq!(init, client_init.to_vec());
        let resp = mechanism.response(&server_init[..]).unwrap();
        assert_eq!(
            String::from_utf8(resp).unwrap(),
            String::from_utf8(client_final.to_vec()).unwrap()
        );
        mechanism.success(&server_final[..]).unwrap();
    }

    #[test]
    fn final_message_as_challenge() {
        let mut mechanism = Scram::new_with_nonce(
            ScramHash::Sha1,
            "user",
            "pencil",
            ChannelBinding::None,
            "fyko+d2lbbFgONRv9qkxdawL".to_owned(),
        )
        .unwrap();
        mechanism.initial();
        mechanism
            .response(b"r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,s=QSXCR+Q6sek8bf92,i=4096")
            .unwrap();
        assert_eq!(
            mechanism.response(b"v=rmF9pqV8S7suAoZWja4dJRkFsKQ=").unwrap(),
            Vec::<u8>::new()
        );
        mechanism.success(b"").unwrap();
        assert_eq!(mechanism.state(), ExchangeState::Completed);
    }

    #[test]
    fn forged_server_signature() {
        let mut mechanism = Scram::new_with_nonce(
            ScramHash::Sha1,
            "user",
            "pencil",
            ChannelBinding::None,
            "fyko+d2lbbFgONRv9qkxdawL".to_owned(),
        )
        .unwrap();
        mechanism.initial();
        mechanism
            .response(b"r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,s=QSXCR+Q6sek8bf92,i=4096")
            .unwrap();
        assert_eq!(
            mechanism.success(b"v=AAAAAAAAAAAAAAAAAAAAAAAAAAA="),
            Err(MechanismError::InvalidServerSignature)
        );
        assert_eq!(mechanism.state(), ExchangeState::Failed);
    }

    #[test]
    fn foreign_nonce() {
        let mut mechanism = Scram::new_with_nonce(
            ScramHash::Sha1,
            "user",
            "pencil",
            ChannelBinding::None,
            "fyko+d2lbbFgONRv9qkxdawL".to_owned(),
        )
        .unwrap();
        mechanism.initial();
        assert_eq!(
            mechanism.response(b"r=somethingelse,s=QSXCR+Q6sek8bf92,i=4096"),
            Err(MechanismError::InvalidServerNonce)
        );
    }

    #[test]
    fn server_error() {
        let mut mechanism = Scram::new_with_nonce(
            ScramHash::Sha1,
            "user",
            "pencil",
            ChannelBinding::None,
            "fyko+d2lbbFgONRv9qkxdawL".to_owned(),
        )
        .unwrap();
        mechanism.initial();
        mechanism
            .response(b"r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,s=QSXCR+Q6sek8bf92,i=4096")
            .unwrap();
        assert_eq!(
            mechanism.success(b"e=invalid-proof"),
            Err(MechanismError::ServerError("invalid-proof".to_owned()))
        );
    }

    #[test]
    fn plus_variant_binds_channel() {
        let binding = ChannelBinding::TlsExporter(vec![0xab; 32]);
        let mut mechanism = Scram::new_with_nonce(
            ScramHash::Sha256,
            "user",
            "pencil",
            binding,
            "abcdef".to_owned(),
        )
        .unwrap();
        assert_eq!(mechanism.name(), "SCRAM-SHA-256-PLUS");
        let init = mechanism.initial().unwrap();
        assert!(init.starts_with(b"p=tls-exporter,,n=user,r=abcdef"));
        let resp = mechanism
            .response(b"r=abcdefXYZ,s=QSXCR+Q6sek8bf92,i=16")
            .unwrap();
        let mut expected_cb = b"p=tls-exporter,,".to_vec();
        expected_cb.extend([0xab; 32]);
        let expected = format!("c={},r=abcdefXYZ,p=", Base64.encode(expected_cb));
        assert!(String::from_utf8(resp).unwrap().starts_with(&expected));
    }

    #[test]
    fn authzid_and_escaping() {
        let creds = Credentials::default()
            .with_username("a,b=c")
            .with_password("pencil")
            .with_authzid("admin@example.org")
            .with_channel_binding(ChannelBinding::Unsupported);
        let mut mechanism = Scram::from_credentials_with_hash(ScramHash::Sha1, creds).unwrap();
        assert_eq!(mechanism.name(), "SCRAM-SHA-1");
        let init = String::from_utf8(mechanism.initial().unwrap()).unwrap();
        assert!(init.starts_with("y,a=admin@example.org,n=a=2Cb=3Dc,r="));
    }
}

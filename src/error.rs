// Error taxonomy for the crypto facade
// Turns engine failure envelopes into typed errors callers can branch on

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error domain reported by the foundation library
pub const FOUNDATION_DOMAIN: &str = "VirgilCryptoFoundation.FoundationError";

/// Code prefix used by foundation errors, followed by `-<status>`
pub const FOUNDATION_CODE_PREFIX: &str = "EVIRGILCRYPTOFOUNDATION.FOUNDATIONERROR";

/// Code a platform reports when it has nothing more specific
pub const UNSPECIFIED_CODE: &str = "EUNSPECIFIED";

const GENERIC_ERROR_NAME: &str = "CryptoError";

/// Raw failure description as it arrives from the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub code: String,
    #[serde(default)]
    pub domain: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_detail: Option<String>,
}

impl ErrorInfo {
    /// Build the error info the foundation library would report for `status`
    pub fn foundation(status: FoundationStatus) -> Self {
        Self {
            code: status.code(),
            domain: FOUNDATION_DOMAIN.to_string(),
            message: status.message().to_string(),
            native_detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.native_detail = Some(detail.into());
        self
    }
}

/// Either a result or an error, never both
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Envelope<T> {
    Result(T),
    Error(ErrorInfo),
}

impl<T> Envelope<T> {
    pub fn ok(value: T) -> Self {
        Envelope::Result(value)
    }

    pub fn status(status: FoundationStatus) -> Self {
        Envelope::Error(ErrorInfo::foundation(status))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Envelope::Error(_))
    }

    /// Unwrap to the value or the mapped, typed error
    pub fn into_result(self) -> Result<T> {
        match self {
            Envelope::Result(value) => Ok(value),
            Envelope::Error(info) => {
                let error = map_error(info);
                tracing::debug!(error = %error, "engine call failed");
                Err(error)
            }
        }
    }
}

impl<T> From<std::result::Result<T, FoundationStatus>> for Envelope<T> {
    fn from(result: std::result::Result<T, FoundationStatus>) -> Self {
        match result {
            Ok(value) => Envelope::Result(value),
            Err(status) => Envelope::status(status),
        }
    }
}

macro_rules! foundation_statuses {
    ($($variant:ident = $code:literal => $message:literal,)*) => {
        /// Status codes of the crypto foundation library
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum FoundationStatus {
            $($variant,)*
        }

        impl FoundationStatus {
            pub const ALL: &'static [FoundationStatus] = &[$(FoundationStatus::$variant,)*];

            pub fn number(self) -> u32 {
                match self {
                    $(FoundationStatus::$variant => $code,)*
                }
            }

            pub fn message(self) -> &'static str {
                match self {
                    $(FoundationStatus::$variant => $message,)*
                }
            }

            pub fn from_number(number: u32) -> Option<Self> {
                match number {
                    $($code => Some(FoundationStatus::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

foundation_statuses! {
    BadArguments = 1 => "Received invalid arguments",
    UninitializedContext = 2 => "Not all context prerequisites are satisfied.",
    UnhandledThirdpartyError = 3 => "Error from one of third-party modules was not handled.",
    SmallBuffer = 101 => "Buffer capacity is not enough to hold result.",
    UnsupportedAlgorithm = 200 => "Unsupported algorithm.",
    AuthFailed = 201 => "Authentication failed during decryption.",
    OutOfData = 202 => "Attempt to read data out of buffer bounds.",
    BadAsn1 = 203 => "ASN.1 encoded data is corrupted.",
    Asn1LossyTypeNarrowing = 204 => "Attempt to read ASN.1 type that is bigger then requested C type.",
    BadPkcs1PublicKey = 205 => "ASN.1 representation of PKCS#1 public key is corrupted.",
    BadPkcs1PrivateKey = 206 => "ASN.1 representation of PKCS#1 private key is corrupted.",
    BadPkcs8PublicKey = 207 => "ASN.1 representation of PKCS#8 public key is corrupted.",
    BadPkcs8PrivateKey = 208 => "ASN.1 representation of PKCS#8 private key is corrupted.",
    BadEncryptedData = 209 => "Encrypted data is corrupted.",
    RandomFailed = 210 => "Underlying random operation returns error.",
    KeyGenerationFailed = 211 => "Generation of the private or secret key failed.",
    EntropySourceFailed = 212 => "One of the entropy sources failed.",
    RngRequestedDataTooBig = 213 => "Requested data to be generated is too big.",
    BadBase64 = 214 => "Base64 encoded string contains invalid characters.",
    BadPem = 215 => "PEM data is corrupted.",
    SharedKeyExchangeFailed = 216 => "Exchange key return zero.",
    BadEd25519PublicKey = 217 => "Ed25519 public key is corrupted.",
    BadEd25519PrivateKey = 218 => "Ed25519 private key is corrupted.",
    BadCurve25519PublicKey = 219 => "CURVE25519 public key is corrupted.",
    BadCurve25519PrivateKey = 220 => "CURVE25519 private key is corrupted.",
    BadSec1PublicKey = 221 => "Elliptic curve public key format is corrupted see RFC 5480.",
    BadSec1PrivateKey = 222 => "Elliptic curve public key format is corrupted see RFC 5915.",
    BadDerPublicKey = 223 => "ASN.1 representation of a public key is corrupted.",
    BadDerPrivateKey = 224 => "ASN.1 representation of a private key is corrupted.",
    MismatchPublicKeyAndAlgorithm = 225 => "Key algorithm does not accept given type of public key.",
    MismatchPrivateKeyAndAlgorithm = 226 => "Key algorithm does not accept given type of private key.",
    NoMessageInfo = 301 => "Decryption failed, because message info was not given explicitly, and was not part of an encrypted message.",
    BadMessageInfo = 302 => "Message Info is corrupted.",
    KeyRecipientIsNotFound = 303 => "Recipient defined with id is not found within message info during data decryption.",
    KeyRecipientPrivateKeyIsWrong = 304 => "Content encryption key can not be decrypted with a given private key.",
    PasswordRecipientPasswordIsWrong = 305 => "Content encryption key can not be decrypted with a given password.",
    MessageInfoCustomParamNotFound = 306 => "Custom parameter with a given key is not found within message info.",
    MessageInfoCustomParamTypeMismatch = 307 => "A custom parameter with a given key is found, but the requested value type does not correspond to the actual type.",
    BadSignature = 308 => "Signature format is corrupted.",
    BadMessageInfoFooter = 309 => "Message Info footer is corrupted.",
    InvalidBrainkeyPasswordLen = 401 => "Brainkey password length is out of range.",
    InvalidBrainkeyFactorLen = 402 => "Brainkey number length should be 32 byte.",
    InvalidBrainkeyPointLen = 403 => "Brainkey point length should be 65 bytes.",
    InvalidBrainkeyKeyNameLen = 404 => "Brainkey name is out of range.",
    BrainkeyInternalError = 405 => "Brainkey internal error.",
    BrainkeyInvalidPoint = 406 => "Brainkey point is invalid.",
    InvalidBrainkeyFactorBufferLen = 407 => "Brainkey number buffer length capacity should be >= 32 byte.",
    InvalidBrainkeyPointBufferLen = 408 => "Brainkey point buffer length capacity should be >= 32 byte.",
    InvalidBrainkeySeedBufferLen = 409 => "Brainkey seed buffer length capacity should be >= 32 byte.",
    InvalidIdentitySecret = 410 => "Brainkey identity secret is invalid.",
    InvalidPadding = 501 => "Invalid padding.",
    ProtobufError = 601 => "Protobuf error.",
    SessionIdDoesntMatch = 701 => "Session id doesnt match.",
    EpochNotFound = 702 => "Epoch not found.",
    WrongKeyType = 703 => "Wrong key type.",
    InvalidSignature = 704 => "Invalid signature.",
    Ed25519Error = 705 => "Ed25519 error.",
    DuplicateEpoch = 706 => "Duplicate epoch.",
    PlainTextTooLong = 707 => "Plain text too long.",
}

impl FoundationStatus {
    /// Full platform code, e.g. `EVIRGILCRYPTOFOUNDATION.FOUNDATIONERROR-702`
    pub fn code(self) -> String {
        format!("{}-{}", FOUNDATION_CODE_PREFIX, self.number())
    }

    /// Parse a platform code of the form `<DOMAIN>-<number>`
    pub fn from_code(code: &str) -> Option<Self> {
        let (prefix, number) = code.rsplit_once('-')?;
        if !prefix.eq_ignore_ascii_case(FOUNDATION_CODE_PREFIX) {
            return None;
        }
        number.parse().ok().and_then(Self::from_number)
    }

    /// Recover a status from its canonical message (exact match only)
    pub fn from_message(message: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|status| status.message() == message)
    }
}

/// An engine-side failure after mapping, kept for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineFault {
    /// Human readable class name derived from the error domain
    pub name: String,
    pub code: String,
    pub message: String,
    pub native_detail: Option<String>,
    pub status: Option<FoundationStatus>,
}

impl fmt::Display for EngineFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.name, self.message, self.code)
    }
}

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid argument \"{label}\": {reason}")]
    InvalidArgument { label: String, reason: String },

    #[error("Invalid key handle: {0}")]
    InvalidKeyHandle(String),

    #[error("The given group id is too short: {actual} bytes, must be at least {min} bytes")]
    GroupIdTooShort { min: usize, actual: usize },

    #[error("Session id mismatch: {0}")]
    SessionIdMismatch(EngineFault),

    #[error("Epoch not found: {0}")]
    EpochNotFound(EngineFault),

    #[error("Invalid signature: {0}")]
    InvalidSignature(EngineFault),

    #[error("{0}")]
    Engine(EngineFault),

    #[error("Engine returned epoch {actual}, expected {expected}")]
    EpochOutOfSequence { expected: u32, actual: u32 },

    #[error("Engine returned malformed \"{field}\": {reason}")]
    MalformedResponse { field: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation timed out")]
    Timeout,

    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

impl CryptoError {
    pub fn invalid_argument(label: impl Into<String>, reason: impl Into<String>) -> Self {
        CryptoError::InvalidArgument {
            label: label.into(),
            reason: reason.into(),
        }
    }

    /// An engine result that passed the boundary but breaks a local invariant
    pub fn malformed_response(field: impl Into<String>, reason: impl Into<String>) -> Self {
        CryptoError::MalformedResponse {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Point an argument error at a different parameter name
    pub(crate) fn relabel(self, label: &str) -> Self {
        match self {
            CryptoError::InvalidArgument { reason, .. } => CryptoError::InvalidArgument {
                label: label.to_string(),
                reason,
            },
            other => other,
        }
    }

    /// Engine diagnostics, if this error came from the engine
    pub fn fault(&self) -> Option<&EngineFault> {
        match self {
            CryptoError::SessionIdMismatch(fault)
            | CryptoError::EpochNotFound(fault)
            | CryptoError::InvalidSignature(fault)
            | CryptoError::Engine(fault) => Some(fault),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<FoundationStatus> {
        self.fault().and_then(|fault| fault.status)
    }
}

pub type Result<T> = std::result::Result<T, CryptoError>;

/// Derive a class name from an error domain.
///
/// `com.example.FoundationException` becomes `FoundationException` with the
/// suffix swapped, i.e. `FoundationError`.
fn error_name_from_domain(domain: &str) -> Option<String> {
    let last = domain.rsplit('.').next().filter(|s| !s.is_empty())?;
    Some(match last.strip_suffix("Exception") {
        Some(stem) => format!("{}Error", stem),
        None => last.to_string(),
    })
}

/// Map an engine failure onto the typed taxonomy
pub fn map_error(info: ErrorInfo) -> CryptoError {
    let by_code = FoundationStatus::from_code(&info.code);
    let status = by_code.or_else(|| {
        if info.code == UNSPECIFIED_CODE || info.code.is_empty() {
            FoundationStatus::from_message(&info.message)
        } else {
            None
        }
    });

    // Terse platform codes get the canonical wording
    let message = match by_code {
        Some(status) => status.message().to_string(),
        None => info.message,
    };

    let fault = EngineFault {
        name: error_name_from_domain(&info.domain).unwrap_or_else(|| GENERIC_ERROR_NAME.to_string()),
        code: info.code,
        message,
        native_detail: info.native_detail,
        status,
    };

    match status {
        Some(FoundationStatus::SessionIdDoesntMatch) => CryptoError::SessionIdMismatch(fault),
        Some(FoundationStatus::EpochNotFound) => CryptoError::EpochNotFound(fault),
        Some(FoundationStatus::InvalidSignature) => CryptoError::InvalidSignature(fault),
        _ => CryptoError::Engine(fault),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip_through_table() {
        for status in FoundationStatus::ALL {
            assert_eq!(FoundationStatus::from_code(&status.code()), Some(*status));
        }
    }

    #[test]
    fn test_terse_code_gets_canonical_message() {
        let info = ErrorInfo {
            code: "EVIRGILCRYPTOFOUNDATION.FOUNDATIONERROR-303".to_string(),
            domain: "VirgilCryptoFoundation.FoundationError".to_string(),
            message: "The operation couldn't be completed.".to_string(),
            native_detail: Some("frame 0".to_string()),
        };
        match map_error(info) {
            CryptoError::Engine(fault) => {
                assert_eq!(fault.name, "FoundationError");
                assert_eq!(fault.message, FoundationStatus::KeyRecipientIsNotFound.message());
                assert_eq!(fault.native_detail.as_deref(), Some("frame 0"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_group_statuses_get_their_own_kinds() {
        let mismatch = map_error(ErrorInfo::foundation(FoundationStatus::SessionIdDoesntMatch));
        assert!(matches!(mismatch, CryptoError::SessionIdMismatch(_)));

        let missing = map_error(ErrorInfo::foundation(FoundationStatus::EpochNotFound));
        assert!(matches!(missing, CryptoError::EpochNotFound(_)));

        let bad_sig = map_error(ErrorInfo::foundation(FoundationStatus::InvalidSignature));
        assert!(matches!(bad_sig, CryptoError::InvalidSignature(_)));
    }

    #[test]
    fn test_unspecified_code_recovers_status_from_exact_message() {
        let info = ErrorInfo {
            code: UNSPECIFIED_CODE.to_string(),
            domain: "com.virgilsecurity.crypto.foundation.FoundationException".to_string(),
            message: "Epoch not found.".to_string(),
            native_detail: None,
        };
        let error = map_error(info);
        assert!(matches!(error, CryptoError::EpochNotFound(_)));
        assert_eq!(error.fault().unwrap().name, "FoundationError");
        assert_eq!(error.fault().unwrap().code, UNSPECIFIED_CODE);

        // Near misses stay generic
        let info = ErrorInfo {
            code: UNSPECIFIED_CODE.to_string(),
            domain: String::new(),
            message: "error: Epoch not found. (extra)".to_string(),
            native_detail: None,
        };
        assert!(matches!(map_error(info), CryptoError::Engine(_)));
    }

    #[test]
    fn test_unknown_error_falls_back_to_generic() {
        let info = ErrorInfo {
            code: "E42".to_string(),
            domain: String::new(),
            message: "something odd".to_string(),
            native_detail: None,
        };
        let fault = map_error(info).fault().cloned().unwrap();
        assert_eq!(fault.name, "CryptoError");
        assert_eq!(fault.message, "something odd");
        assert_eq!(fault.status, None);
    }

    #[test]
    fn test_envelope_wire_shape() {
        let ok: Envelope<String> = serde_json::from_str(r#"{"result":"ZGF0YQ=="}"#).unwrap();
        assert_eq!(ok.into_result().unwrap(), "ZGF0YQ==");

        let err: Envelope<String> = serde_json::from_str(
            r#"{"error":{"code":"EVIRGILCRYPTOFOUNDATION.FOUNDATIONERROR-704","domain":"VirgilCryptoFoundation.FoundationError","message":"x"}}"#,
        )
        .unwrap();
        assert!(matches!(err.into_result(), Err(CryptoError::InvalidSignature(_))));
    }

    #[test]
    fn test_relabel_only_touches_arguments() {
        let err = CryptoError::invalid_argument("encoding", "bad").relabel("data");
        assert!(matches!(err, CryptoError::InvalidArgument { ref label, .. } if label == "data"));
        assert!(matches!(CryptoError::Timeout.relabel("data"), CryptoError::Timeout));
    }
}

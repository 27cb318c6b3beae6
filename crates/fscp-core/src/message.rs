//! Message encoding and decoding for the FSCP wire protocol.
//!
//! Every datagram carries exactly one message: a 4-byte header (version,
//! type, big-endian payload length) followed by a type-specific payload.
//! All multi-byte fields are big-endian. Variable-length fields are
//! prefixed by a 16-bit length.
//!
//! DATA messages fold the channel index into the type byte: channel `c` is
//! sent as type `0x70 + c`, with `c` at most [`MAX_DATA_CHANNEL`].

use crate::error::MessageError;
use fscp_crypto::{CipherSuite, EllipticCurve};
use rand::RngCore;
use std::fmt;

/// The mandatory protocol version byte.
pub const MESSAGE_VERSION: u8 = 3;

/// Size of the fixed message header.
pub const HEADER_SIZE: usize = 4;

/// Size of a host identifier.
pub const HOST_IDENTIFIER_SIZE: usize = 32;

/// Size of the GCM tag field in DATA messages.
pub const GCM_TAG_SIZE: usize = 16;

/// The highest channel index representable in the DATA type range.
pub const MAX_DATA_CHANNEL: u8 = 0x8c;

const TYPE_HELLO_REQUEST: u8 = 0x00;
const TYPE_HELLO_RESPONSE: u8 = 0x01;
const TYPE_PRESENTATION: u8 = 0x02;
const TYPE_SESSION_REQUEST: u8 = 0x03;
const TYPE_SESSION: u8 = 0x04;
const TYPE_DATA_BASE: u8 = 0x70;
const TYPE_CONTACT_REQUEST: u8 = 0xfd;
const TYPE_CONTACT: u8 = 0xfe;
const TYPE_KEEP_ALIVE: u8 = 0xff;

/// A random 32-byte per-endpoint identity.
///
/// Included in signed handshake messages to bind key derivation to endpoint
/// identity. Equality is byte-exact.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostIdentifier(pub [u8; HOST_IDENTIFIER_SIZE]);

impl HostIdentifier {
    /// Generate a fresh random host identifier.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; HOST_IDENTIFIER_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);

        Self(bytes)
    }

    /// The raw identifier bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; HOST_IDENTIFIER_SIZE] {
        &self.0
    }
}

impl fmt::Display for HostIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }

        Ok(())
    }
}

impl fmt::Debug for HostIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostIdentifier({self})")
    }
}

/// A message type, as carried in the header's type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// A HELLO request.
    HelloRequest,
    /// A HELLO response.
    HelloResponse,
    /// A PRESENTATION message.
    Presentation,
    /// A SESSION REQUEST message.
    SessionRequest,
    /// A SESSION message.
    Session,
    /// A DATA message on the given channel.
    Data(u8),
    /// A CONTACT REQUEST message.
    ContactRequest,
    /// A CONTACT message.
    Contact,
    /// A KEEP-ALIVE message.
    KeepAlive,
}

impl MessageType {
    /// The wire type byte, or an error for an out-of-range DATA channel.
    pub fn code(self) -> Result<u8, MessageError> {
        match self {
            Self::HelloRequest => Ok(TYPE_HELLO_REQUEST),
            Self::HelloResponse => Ok(TYPE_HELLO_RESPONSE),
            Self::Presentation => Ok(TYPE_PRESENTATION),
            Self::SessionRequest => Ok(TYPE_SESSION_REQUEST),
            Self::Session => Ok(TYPE_SESSION),
            Self::Data(channel) if channel <= MAX_DATA_CHANNEL => Ok(TYPE_DATA_BASE + channel),
            Self::Data(channel) => Err(MessageError::BadField {
                field: "channel",
                cause: format!("channel 0x{channel:02x} exceeds 0x{MAX_DATA_CHANNEL:02x}"),
            }),
            Self::ContactRequest => Ok(TYPE_CONTACT_REQUEST),
            Self::Contact => Ok(TYPE_CONTACT),
            Self::KeepAlive => Ok(TYPE_KEEP_ALIVE),
        }
    }

    /// Map a wire type byte to a message type.
    pub fn from_code(code: u8) -> Result<Self, MessageError> {
        match code {
            TYPE_HELLO_REQUEST => Ok(Self::HelloRequest),
            TYPE_HELLO_RESPONSE => Ok(Self::HelloResponse),
            TYPE_PRESENTATION => Ok(Self::Presentation),
            TYPE_SESSION_REQUEST => Ok(Self::SessionRequest),
            TYPE_SESSION => Ok(Self::Session),
            TYPE_CONTACT_REQUEST => Ok(Self::ContactRequest),
            TYPE_CONTACT => Ok(Self::Contact),
            TYPE_KEEP_ALIVE => Ok(Self::KeepAlive),
            code if (TYPE_DATA_BASE..=TYPE_DATA_BASE + MAX_DATA_CHANNEL).contains(&code) => {
                Ok(Self::Data(code - TYPE_DATA_BASE))
            }
            other => Err(MessageError::UnknownType(other)),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HelloRequest => "HELLO (request)",
            Self::HelloResponse => "HELLO (response)",
            Self::Presentation => "PRESENTATION",
            Self::SessionRequest => "SESSION (request)",
            Self::Session => "SESSION",
            Self::Data(_) => "DATA",
            Self::ContactRequest => "CONTACT (request)",
            Self::Contact => "CONTACT",
            Self::KeepAlive => "KEEP-ALIVE",
        };

        f.write_str(name)
    }
}

/// A HELLO request or response payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloMessage {
    /// The random number pairing a response with its request.
    pub unique_number: u32,
}

impl fmt::Display for HelloMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HELLO [unique_number:{:08x}]", self.unique_number)
    }
}

/// A PRESENTATION payload.
///
/// An absent certificate (zero-length on the wire) signals preshared-key
/// mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentationMessage {
    /// The DER-encoded X.509 certificate, if any.
    pub certificate: Option<Vec<u8>>,
}

impl fmt::Display for PresentationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.certificate {
            Some(der) => write!(f, "PRESENTATION [cert:{} byte(s)]", der.len()),
            None => f.write_str("PRESENTATION [cert:]"),
        }
    }
}

/// A SESSION REQUEST payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequestMessage {
    /// The requested session number.
    pub session_number: u32,
    /// The sender's host identifier.
    pub host_identifier: HostIdentifier,
    /// The sender's cipher suites, in preference order.
    pub cipher_suites: Vec<CipherSuite>,
    /// The sender's elliptic curves, in preference order.
    pub elliptic_curves: Vec<EllipticCurve>,
    /// The signature over the unsigned prefix.
    pub signature: Vec<u8>,
}

impl SessionRequestMessage {
    /// Serialize every field preceding the signature length.
    ///
    /// This is the exact byte sequence covered by the signature.
    #[must_use]
    pub fn serialize_unsigned(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            4 + HOST_IDENTIFIER_SIZE + 2 + self.cipher_suites.len() + 2
                + self.elliptic_curves.len(),
        );

        buf.extend_from_slice(&self.session_number.to_be_bytes());
        buf.extend_from_slice(self.host_identifier.as_bytes());
        buf.extend_from_slice(&(self.cipher_suites.len() as u16).to_be_bytes());
        buf.extend(self.cipher_suites.iter().map(|s| s.as_u8()));
        buf.extend_from_slice(&(self.elliptic_curves.len() as u16).to_be_bytes());
        buf.extend(self.elliptic_curves.iter().map(|c| c.as_u8()));

        buf
    }
}

impl fmt::Display for SessionRequestMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SESSION_REQUEST [sid:{:08x},hid:{},ciphers:{},curves:{}]",
            self.session_number,
            self.host_identifier,
            join(&self.cipher_suites),
            join(&self.elliptic_curves),
        )
    }
}

/// A SESSION payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMessage {
    /// The session number this message answers.
    pub session_number: u32,
    /// The sender's host identifier.
    pub host_identifier: HostIdentifier,
    /// The negotiated cipher suite.
    pub cipher_suite: CipherSuite,
    /// The negotiated elliptic curve.
    pub elliptic_curve: EllipticCurve,
    /// The sender's PEM-encoded ECDHE public key.
    pub public_key: Vec<u8>,
    /// The signature over the unsigned prefix.
    pub signature: Vec<u8>,
}

impl SessionMessage {
    /// Serialize every field preceding the signature length.
    #[must_use]
    pub fn serialize_unsigned(&self) -> Vec<u8> {
        let mut buf =
            Vec::with_capacity(4 + HOST_IDENTIFIER_SIZE + 4 + 2 + self.public_key.len());

        buf.extend_from_slice(&self.session_number.to_be_bytes());
        buf.extend_from_slice(self.host_identifier.as_bytes());
        buf.push(self.cipher_suite.as_u8());
        buf.push(self.elliptic_curve.as_u8());
        // Two reserved bytes, always zero.
        buf.extend_from_slice(&[0x00, 0x00]);
        buf.extend_from_slice(&(self.public_key.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.public_key);

        buf
    }
}

impl fmt::Display for SessionMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SESSION [sid:{:08x},hid:{},cipher:{},curve:{}]",
            self.session_number, self.host_identifier, self.cipher_suite, self.elliptic_curve,
        )
    }
}

/// A DATA-family payload, shared by DATA, CONTACT REQUEST, CONTACT and
/// KEEP-ALIVE messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMessage {
    /// The channel index (0 for the CONTACT and KEEP-ALIVE types).
    pub channel: u8,
    /// The sender sequence number.
    pub sequence_number: u32,
    /// The detached GCM authentication tag.
    pub tag: [u8; GCM_TAG_SIZE],
    /// The ciphertext.
    pub ciphertext: Vec<u8>,
}

impl fmt::Display for DataMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DATA [ch:{:1x},seq:{:08x},clen:{}]",
            self.channel,
            self.sequence_number,
            self.ciphertext.len(),
        )
    }
}

/// A parsed FSCP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A HELLO request.
    HelloRequest(HelloMessage),
    /// A HELLO response.
    HelloResponse(HelloMessage),
    /// A PRESENTATION message.
    Presentation(PresentationMessage),
    /// A SESSION REQUEST message.
    SessionRequest(SessionRequestMessage),
    /// A SESSION message.
    Session(SessionMessage),
    /// A DATA message; the channel lives in the payload struct.
    Data(DataMessage),
    /// A CONTACT REQUEST message.
    ContactRequest(DataMessage),
    /// A CONTACT message.
    Contact(DataMessage),
    /// A KEEP-ALIVE message.
    KeepAlive(DataMessage),
}

impl Message {
    /// The type of this message.
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::HelloRequest(_) => MessageType::HelloRequest,
            Self::HelloResponse(_) => MessageType::HelloResponse,
            Self::Presentation(_) => MessageType::Presentation,
            Self::SessionRequest(_) => MessageType::SessionRequest,
            Self::Session(_) => MessageType::Session,
            Self::Data(data) => MessageType::Data(data.channel),
            Self::ContactRequest(_) => MessageType::ContactRequest,
            Self::Contact(_) => MessageType::Contact,
            Self::KeepAlive(_) => MessageType::KeepAlive,
        }
    }

    fn payload_size(&self) -> usize {
        match self {
            Self::HelloRequest(_) | Self::HelloResponse(_) => 4,
            Self::Presentation(p) => {
                2 + p.certificate.as_ref().map_or(0, Vec::len)
            }
            Self::SessionRequest(r) => {
                4 + HOST_IDENTIFIER_SIZE
                    + 2
                    + r.cipher_suites.len()
                    + 2
                    + r.elliptic_curves.len()
                    + 2
                    + r.signature.len()
            }
            Self::Session(s) => {
                4 + HOST_IDENTIFIER_SIZE + 4 + 2 + s.public_key.len() + 2 + s.signature.len()
            }
            Self::Data(d) | Self::ContactRequest(d) | Self::Contact(d) | Self::KeepAlive(d) => {
                4 + GCM_TAG_SIZE + 2 + d.ciphertext.len()
            }
        }
    }

    /// Serialize the message into a datagram.
    pub fn serialize(&self) -> Result<Vec<u8>, MessageError> {
        let payload_size = self.payload_size();

        if payload_size > usize::from(u16::MAX) {
            return Err(MessageError::BadField {
                field: "payload_length",
                cause: format!(
                    "payload of {payload_size} byte(s) exceeds the 16-bit length field"
                ),
            });
        }

        let mut buf = Vec::with_capacity(HEADER_SIZE + payload_size);
        buf.push(MESSAGE_VERSION);
        buf.push(self.message_type().code()?);
        buf.extend_from_slice(&(payload_size as u16).to_be_bytes());

        match self {
            Self::HelloRequest(h) | Self::HelloResponse(h) => {
                buf.extend_from_slice(&h.unique_number.to_be_bytes());
            }
            Self::Presentation(p) => match &p.certificate {
                Some(der) => {
                    buf.extend_from_slice(&(der.len() as u16).to_be_bytes());
                    buf.extend_from_slice(der);
                }
                None => buf.extend_from_slice(&0u16.to_be_bytes()),
            },
            Self::SessionRequest(r) => {
                buf.extend_from_slice(&r.serialize_unsigned());
                buf.extend_from_slice(&(r.signature.len() as u16).to_be_bytes());
                buf.extend_from_slice(&r.signature);
            }
            Self::Session(s) => {
                buf.extend_from_slice(&s.serialize_unsigned());
                buf.extend_from_slice(&(s.signature.len() as u16).to_be_bytes());
                buf.extend_from_slice(&s.signature);
            }
            Self::Data(d) | Self::ContactRequest(d) | Self::Contact(d) | Self::KeepAlive(d) => {
                buf.extend_from_slice(&d.sequence_number.to_be_bytes());
                buf.extend_from_slice(&d.tag);
                buf.extend_from_slice(&(d.ciphertext.len() as u16).to_be_bytes());
                buf.extend_from_slice(&d.ciphertext);
            }
        }

        Ok(buf)
    }

    /// Parse one datagram into a message.
    ///
    /// The buffer must contain exactly the header and the declared payload.
    pub fn parse(data: &[u8]) -> Result<Self, MessageError> {
        if data.len() < HEADER_SIZE {
            return Err(MessageError::ShortHeader(data.len()));
        }

        if data[0] != MESSAGE_VERSION {
            return Err(MessageError::BadVersion(data[0]));
        }

        let message_type = MessageType::from_code(data[1])?;
        let declared = usize::from(u16::from_be_bytes([data[2], data[3]]));
        let payload = &data[HEADER_SIZE..];

        if payload.len() != declared {
            return Err(MessageError::ShortPayload {
                expected: declared,
                got: payload.len(),
            });
        }

        let mut reader = Reader::new(payload);

        let message = match message_type {
            MessageType::HelloRequest | MessageType::HelloResponse => {
                let hello = HelloMessage {
                    unique_number: reader.read_u32("unique_number")?,
                };

                if message_type == MessageType::HelloRequest {
                    Self::HelloRequest(hello)
                } else {
                    Self::HelloResponse(hello)
                }
            }
            MessageType::Presentation => {
                let der = reader.read_vec16("certificate")?;

                Self::Presentation(PresentationMessage {
                    certificate: if der.is_empty() {
                        None
                    } else {
                        Some(der.to_vec())
                    },
                })
            }
            MessageType::SessionRequest => Self::SessionRequest(SessionRequestMessage {
                session_number: reader.read_u32("session_number")?,
                host_identifier: reader.read_host_identifier()?,
                cipher_suites: reader
                    .read_vec16("cipher_suites")?
                    .iter()
                    .map(|&b| CipherSuite(b))
                    .collect(),
                elliptic_curves: reader
                    .read_vec16("elliptic_curves")?
                    .iter()
                    .map(|&b| EllipticCurve(b))
                    .collect(),
                signature: reader.read_vec16("signature")?.to_vec(),
            }),
            MessageType::Session => {
                let session_number = reader.read_u32("session_number")?;
                let host_identifier = reader.read_host_identifier()?;
                let cipher_suite = CipherSuite(reader.read_u8("cipher_suite")?);
                let elliptic_curve = EllipticCurve(reader.read_u8("elliptic_curve")?);
                reader.read_bytes(2, "reserved")?;

                Self::Session(SessionMessage {
                    session_number,
                    host_identifier,
                    cipher_suite,
                    elliptic_curve,
                    public_key: reader.read_vec16("public_key")?.to_vec(),
                    signature: reader.read_vec16("signature")?.to_vec(),
                })
            }
            MessageType::Data(channel) => Self::Data(reader.read_data(channel)?),
            MessageType::ContactRequest => Self::ContactRequest(reader.read_data(0)?),
            MessageType::Contact => Self::Contact(reader.read_data(0)?),
            MessageType::KeepAlive => Self::KeepAlive(reader.read_data(0)?),
        };

        reader.finish()?;

        Ok(message)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HelloRequest(h) | Self::HelloResponse(h) => h.fmt(f),
            Self::Presentation(p) => p.fmt(f),
            Self::SessionRequest(r) => r.fmt(f),
            Self::Session(s) => s.fmt(f),
            Self::Data(d) | Self::ContactRequest(d) | Self::Contact(d) | Self::KeepAlive(d) => {
                d.fmt(f)
            }
        }
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// A bounds-checked payload cursor whose errors name the failing field.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn read_bytes(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], MessageError> {
        if self.remaining() < n {
            return Err(MessageError::BadField {
                field,
                cause: format!("need {} byte(s) but only {} remain", n, self.remaining()),
            });
        }

        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;

        Ok(bytes)
    }

    fn read_u8(&mut self, field: &'static str) -> Result<u8, MessageError> {
        Ok(self.read_bytes(1, field)?[0])
    }

    fn read_u16(&mut self, field: &'static str) -> Result<u16, MessageError> {
        let bytes = self.read_bytes(2, field)?;

        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self, field: &'static str) -> Result<u32, MessageError> {
        let bytes = self.read_bytes(4, field)?;

        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_vec16(&mut self, field: &'static str) -> Result<&'a [u8], MessageError> {
        let len = usize::from(self.read_u16(field)?);

        self.read_bytes(len, field)
    }

    fn read_host_identifier(&mut self) -> Result<HostIdentifier, MessageError> {
        let bytes = self.read_bytes(HOST_IDENTIFIER_SIZE, "host_identifier")?;
        let mut identifier = [0u8; HOST_IDENTIFIER_SIZE];
        identifier.copy_from_slice(bytes);

        Ok(HostIdentifier(identifier))
    }

    fn read_data(&mut self, channel: u8) -> Result<DataMessage, MessageError> {
        let sequence_number = self.read_u32("sequence_number")?;
        let tag_bytes = self.read_bytes(GCM_TAG_SIZE, "gcm_tag")?;
        let mut tag = [0u8; GCM_TAG_SIZE];
        tag.copy_from_slice(tag_bytes);

        Ok(DataMessage {
            channel,
            sequence_number,
            tag,
            ciphertext: self.read_vec16("ciphertext")?.to_vec(),
        })
    }

    fn finish(&self) -> Result<(), MessageError> {
        if self.remaining() != 0 {
            return Err(MessageError::BadField {
                field: "payload",
                cause: format!("{} trailing byte(s) after the last field", self.remaining()),
            });
        }

        Ok(())
    }
}

//! The framing and field encoding spoken over the client socket, grounded
//! on the original project's `nslcd.h` and `common/tio.*`-based
//! `nslcd-prot.h` marshalling macros. A request is a version, an
//! [`Opcode`], and opcode-specific fields; a response is zero or more
//! `BEGIN`-prefixed entries followed by a terminating [`ResultCode`].
//!
//! Every function here is a thin, independently testable wrapper around a
//! [`nslcd_tio::FramedStream`]; the per-database request parsers and entry
//! formatters that call them live with the request handlers, closer to the
//! attribute map they also depend on.

mod opcode;
mod pam;

pub use opcode::Opcode;
pub use pam::PamStatus;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use nslcd_tio::{FramedStream, TioError};

/// Protocol version sent at the start of every request.
pub const VERSION: i32 = 2;

/// Precedes each streamed entry in a response; anything else in that
/// position is a [`ResultCode`] terminating the stream.
pub const BEGIN: i32 = 1;

/// Upper bound on a single length-prefixed string, guarding against a
/// corrupt or hostile peer claiming an absurd allocation.
const MAX_STRING_LEN: usize = 1024 * 1024;

/// Upper bound on the number of entries in a length-prefixed list.
const MAX_LIST_LEN: usize = 100_000;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error(transparent)]
    Io(#[from] TioError),
    #[error("request used protocol version {0}, expected {VERSION}")]
    VersionMismatch(i32),
    #[error("unknown opcode {0}")]
    UnknownOpcode(i32),
    #[error("unknown result code {0}")]
    UnknownResultCode(i32),
    #[error("unknown address family {0}")]
    UnknownAddressFamily(i32),
    #[error("string length {0} is negative or exceeds the {MAX_STRING_LEN} byte limit")]
    StringTooLong(i64),
    #[error("list length {0} is negative or exceeds the {MAX_LIST_LEN} entry limit")]
    ListTooLong(i64),
    #[error("field was not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("address of family {family:?} must be {expected} bytes, got {actual}")]
    BadAddressLength {
        family: AddressFamily,
        expected: usize,
        actual: usize,
    },
}

/// Terminates a response: either the stream is complete (`Success`,
/// possibly after zero entries meaning "not found" for all-entries
/// enumerations) or a failure each meaning something distinct to the
/// NSS/PAM caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ResultCode {
    Success = 0,
    NotFound = 2,
    Unavail = 3,
    TryAgain = 4,
}

impl TryFrom<i32> for ResultCode {
    type Error = ProtoError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ResultCode::Success),
            2 => Ok(ResultCode::NotFound),
            3 => Ok(ResultCode::Unavail),
            4 => Ok(ResultCode::TryAgain),
            other => Err(ProtoError::UnknownResultCode(other)),
        }
    }
}

impl From<ResultCode> for i32 {
    fn from(rc: ResultCode) -> i32 {
        rc as i32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum AddressFamily {
    Ipv4 = 1,
    Ipv6 = 2,
}

impl AddressFamily {
    fn byte_len(self) -> usize {
        match self {
            AddressFamily::Ipv4 => 4,
            AddressFamily::Ipv6 => 16,
        }
    }
}

impl TryFrom<i32> for AddressFamily {
    type Error = ProtoError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(AddressFamily::Ipv4),
            2 => Ok(AddressFamily::Ipv6),
            other => Err(ProtoError::UnknownAddressFamily(other)),
        }
    }
}

/// A raw network address as looked up in `hosts`/`networks`: the family tag
/// plus the address bytes in network byte order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub family: AddressFamily,
    pub bytes: Vec<u8>,
}

impl Address {
    pub fn new(family: AddressFamily, bytes: Vec<u8>) -> Result<Self, ProtoError> {
        let expected = family.byte_len();
        if bytes.len() != expected {
            return Err(ProtoError::BadAddressLength {
                family,
                expected,
                actual: bytes.len(),
            });
        }
        Ok(Address { family, bytes })
    }
}

pub type Stream<S> = FramedStream<S>;

pub async fn write_i32<S>(io: &mut Stream<S>, value: i32) -> Result<(), ProtoError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    io.write(&value.to_be_bytes()).await?;
    Ok(())
}

pub async fn read_i32<S>(io: &mut Stream<S>) -> Result<i32, ProtoError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let bytes = io.read_exact(4).await?;
    Ok(i32::from_be_bytes(bytes.try_into().expect("read_exact(4) returns 4 bytes")))
}

pub async fn write_string<S>(io: &mut Stream<S>, value: &str) -> Result<(), ProtoError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_i32(io, value.len() as i32).await?;
    io.write(value.as_bytes()).await?;
    Ok(())
}

pub async fn read_string<S>(io: &mut Stream<S>) -> Result<String, ProtoError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let len = read_i32(io).await? as i64;
    if len < 0 || len as usize > MAX_STRING_LEN {
        return Err(ProtoError::StringTooLong(len));
    }
    let bytes = io.read_exact(len as usize).await?;
    Ok(String::from_utf8(bytes)?)
}

pub async fn write_string_list<S>(io: &mut Stream<S>, values: &[String]) -> Result<(), ProtoError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_i32(io, values.len() as i32).await?;
    for value in values {
        write_string(io, value).await?;
    }
    Ok(())
}

pub async fn read_string_list<S>(io: &mut Stream<S>) -> Result<Vec<String>, ProtoError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let count = read_i32(io).await? as i64;
    if count < 0 || count as usize > MAX_LIST_LEN {
        return Err(ProtoError::ListTooLong(count));
    }
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(read_string(io).await?);
    }
    Ok(out)
}

pub async fn write_address<S>(io: &mut Stream<S>, address: &Address) -> Result<(), ProtoError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_i32(io, address.family as i32).await?;
    write_i32(io, address.bytes.len() as i32).await?;
    io.write(&address.bytes).await?;
    Ok(())
}

pub async fn read_address<S>(io: &mut Stream<S>) -> Result<Address, ProtoError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let family = AddressFamily::try_from(read_i32(io).await?)?;
    let len = read_i32(io).await? as i64;
    if len < 0 || len as usize > MAX_STRING_LEN {
        return Err(ProtoError::StringTooLong(len));
    }
    let bytes = io.read_exact(len as usize).await?;
    Address::new(family, bytes)
}

/// Write the `BEGIN` marker that precedes each streamed entry.
pub async fn write_begin<S>(io: &mut Stream<S>) -> Result<(), ProtoError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_i32(io, BEGIN).await
}

pub async fn write_result_code<S>(io: &mut Stream<S>, code: ResultCode) -> Result<(), ProtoError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_i32(io, code.into()).await
}

pub async fn read_result_code<S>(io: &mut Stream<S>) -> Result<ResultCode, ProtoError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    ResultCode::try_from(read_i32(io).await?)
}

/// Read a request header: the protocol version (checked against
/// [`VERSION`]) followed by the opcode.
pub async fn read_request_header<S>(io: &mut Stream<S>) -> Result<Opcode, ProtoError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let version = read_i32(io).await?;
    if version != VERSION {
        return Err(ProtoError::VersionMismatch(version));
    }
    Opcode::try_from(read_i32(io).await?)
}

/// Write a response header: the opcode the response answers, echoed back
/// so a pipelining client (we don't support pipelining, but NSS modules
/// built against other implementations may) can match replies to requests.
pub async fn write_response_header<S>(io: &mut Stream<S>, opcode: Opcode) -> Result<(), ProtoError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_i32(io, opcode.into()).await
}

/// Write a PAM operation's outcome: the status code followed by an
/// optional human-readable message (empty string when there is none),
/// matching the original's `NSLCD_PAM_*` response shape.
pub async fn write_pam_result<S>(
    io: &mut Stream<S>,
    status: PamStatus,
    message: Option<&str>,
) -> Result<(), ProtoError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_i32(io, status.into()).await?;
    write_string(io, message.unwrap_or("")).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::duplex;

    async fn roundtrip_pair() -> (FramedStream<tokio::io::DuplexStream>, FramedStream<tokio::io::DuplexStream>) {
        let (a, b) = duplex(8192);
        let timeout = Duration::from_secs(5);
        (
            FramedStream::new(a, timeout, timeout),
            FramedStream::new(b, timeout, timeout),
        )
    }

    #[tokio::test]
    async fn string_round_trips_through_the_wire() {
        let (mut writer, mut reader) = roundtrip_pair().await;
        write_string(&mut writer, "cn=admin,dc=example,dc=com").await.unwrap();
        writer.flush().await.unwrap();
        let got = read_string(&mut reader).await.unwrap();
        assert_eq!(got, "cn=admin,dc=example,dc=com");
    }

    #[tokio::test]
    async fn string_list_round_trips_including_empty_list() {
        let (mut writer, mut reader) = roundtrip_pair().await;
        write_string_list(&mut writer, &[]).await.unwrap();
        writer.flush().await.unwrap();
        assert_eq!(read_string_list(&mut reader).await.unwrap(), Vec::<String>::new());

        let (mut writer, mut reader) = roundtrip_pair().await;
        let values = vec!["a".to_string(), "bb".to_string(), "ccc".to_string()];
        write_string_list(&mut writer, &values).await.unwrap();
        writer.flush().await.unwrap();
        assert_eq!(read_string_list(&mut reader).await.unwrap(), values);
    }

    #[tokio::test]
    async fn address_round_trips_and_validates_length() {
        let (mut writer, mut reader) = roundtrip_pair().await;
        let addr = Address::new(AddressFamily::Ipv4, vec![127, 0, 0, 1]).unwrap();
        write_address(&mut writer, &addr).await.unwrap();
        writer.flush().await.unwrap();
        assert_eq!(read_address(&mut reader).await.unwrap(), addr);

        assert!(matches!(
            Address::new(AddressFamily::Ipv4, vec![1, 2, 3]),
            Err(ProtoError::BadAddressLength { .. })
        ));
    }

    #[tokio::test]
    async fn request_header_rejects_mismatched_version() {
        let (mut writer, mut reader) = roundtrip_pair().await;
        write_i32(&mut writer, VERSION + 1).await.unwrap();
        write_i32(&mut writer, Opcode::PasswdByName.into()).await.unwrap();
        writer.flush().await.unwrap();
        assert!(matches!(
            read_request_header(&mut reader).await,
            Err(ProtoError::VersionMismatch(_))
        ));
    }

    #[tokio::test]
    async fn request_header_round_trips_opcode() {
        let (mut writer, mut reader) = roundtrip_pair().await;
        write_i32(&mut writer, VERSION).await.unwrap();
        write_i32(&mut writer, Opcode::GroupByGid.into()).await.unwrap();
        writer.flush().await.unwrap();
        assert_eq!(read_request_header(&mut reader).await.unwrap(), Opcode::GroupByGid);
    }

    #[tokio::test]
    async fn result_code_round_trips() {
        let (mut writer, mut reader) = roundtrip_pair().await;
        write_result_code(&mut writer, ResultCode::TryAgain).await.unwrap();
        writer.flush().await.unwrap();
        assert_eq!(read_result_code(&mut reader).await.unwrap(), ResultCode::TryAgain);
    }

    #[tokio::test]
    async fn begin_marker_is_distinct_from_every_result_code() {
        assert_ne!(BEGIN, i32::from(ResultCode::Success));
        assert_ne!(BEGIN, i32::from(ResultCode::NotFound));
        assert_ne!(BEGIN, i32::from(ResultCode::Unavail));
        assert_ne!(BEGIN, i32::from(ResultCode::TryAgain));
    }
}

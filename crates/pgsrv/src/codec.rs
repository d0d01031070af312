use crate::backend::Value;
use crate::errors::{PgSrvError, Result};
use crate::messages::{
    BackendMessage, DescribeObjectType, FrontendMessage, StartupMessage, TransactionStatus,
    VERSION_CANCEL, VERSION_GSSENC, VERSION_SSL, VERSION_V3,
};
use bytes::{Buf, BufMut, BytesMut};
use futures::{SinkExt, TryStreamExt};
use std::collections::HashMap;
use std::str;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder, Framed};
use tracing::trace;

/// Startup packets are small, anything larger is garbage.
const MAX_STARTUP_PACKET_LEN: usize = 10_000;

/// Postgres caps a single message at 1GB.
const MAX_MESSAGE_LEN: usize = 1 << 30;

/// A connection that can encode and decode postgres protocol messages.
pub struct FramedConn<C> {
    conn: Framed<C, PgCodec>,
}

impl<C> FramedConn<C>
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a new framed connection.
    pub fn new(conn: C) -> Self {
        FramedConn {
            conn: Framed::new(conn, PgCodec),
        }
    }

    /// Reads a single, complete frontend message.
    ///
    /// Returns `None` once the underlying connection terminates.
    pub async fn read(&mut self) -> Result<Option<FrontendMessage>> {
        let msg = self.conn.try_next().await?;
        match &msg {
            Some(msg) => trace!(?msg, "read message"),
            None => trace!("read message (None)"),
        };
        Ok(msg)
    }

    /// Sends a single backend message to the underlying connection, flushing
    /// immediately.
    pub async fn send(&mut self, msg: BackendMessage) -> Result<()> {
        trace!(?msg, "sending message");
        self.conn.send(msg).await
    }

    /// Buffer a backend message without flushing.
    pub async fn feed(&mut self, msg: BackendMessage) -> Result<()> {
        trace!(?msg, "buffering message");
        self.conn.feed(msg).await
    }

    /// Flush all buffered messages.
    pub async fn flush(&mut self) -> Result<()> {
        SinkExt::<BackendMessage>::flush(&mut self.conn).await
    }

    /// Shut down the write half of the underlying connection.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.conn.get_mut().shutdown().await?;
        Ok(())
    }
}

trait BufStringMut: BufMut {
    /// Put a null-terminated string in the buffer.
    fn put_cstring(&mut self, s: &str);
}

impl<B: BufMut> BufStringMut for B {
    fn put_cstring(&mut self, s: &str) {
        self.put(s.as_bytes());
        self.put_u8(0);
    }
}

/// Bounds checked reader over a single message body.
#[derive(Debug)]
struct Cursor<'a> {
    buf: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Cursor { buf }
    }

    fn read_cstring(&mut self) -> Result<&'a str> {
        match self.buf.iter().position(|b| *b == 0) {
            Some(pos) => {
                let s = str::from_utf8(&self.buf[0..pos])?;
                self.buf = &self.buf[pos + 1..];
                Ok(s)
            }
            None => Err(PgSrvError::MissingNullByte),
        }
    }

    fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    fn read_i16(&mut self) -> Result<i16> {
        self.ensure(2)?;
        Ok(self.buf.get_i16())
    }

    fn read_i32(&mut self) -> Result<i32> {
        self.ensure(4)?;
        Ok(self.buf.get_i32())
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.ensure(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    /// Read an i16 count followed by that many items.
    fn read_list<T>(&mut self, mut f: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        let n = self.read_i16()?;
        let n = usize::try_from(n).map_err(|_| PgSrvError::MsgTruncated)?;
        let mut items = Vec::with_capacity(n);
        for _ in 0..n {
            items.push(f(self)?);
        }
        Ok(items)
    }

    fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn next_is_null_byte(&self) -> bool {
        !self.buf.is_empty() && self.buf[0] == 0
    }

    fn ensure(&self, n: usize) -> Result<()> {
        if self.buf.len() < n {
            return Err(PgSrvError::MsgTruncated);
        }
        Ok(())
    }
}

pub struct PgCodec;

impl PgCodec {
    /// Decode a startup message from some underlying connection.
    ///
    /// Note that this falls outside the typical flow for decoding frontend
    /// messages since startup messages have no type byte.
    pub async fn decode_startup_from_conn<C>(conn: &mut C) -> Result<StartupMessage>
    where
        C: AsyncRead + Unpin,
    {
        let msg_len = conn.read_i32().await?;
        let msg_len = usize::try_from(msg_len)
            .ok()
            .filter(|len| (8..=MAX_STARTUP_PACKET_LEN).contains(len))
            .ok_or(PgSrvError::InvalidStartupLength(msg_len as usize))?;

        let mut buf = BytesMut::zeroed(msg_len - 4);
        conn.read_exact(&mut buf).await?;

        let mut buf = Cursor::new(&buf);
        let version = buf.read_i32()?;

        match version {
            VERSION_V3 => (), // Continue with normal startup flow.
            VERSION_SSL => return Ok(StartupMessage::SSLRequest { version }),
            VERSION_GSSENC => return Ok(StartupMessage::GssEncRequest { version }),
            VERSION_CANCEL => return Ok(StartupMessage::CancelRequest { version }),
            other => return Err(PgSrvError::InvalidProtocolVersion(other)),
        }

        let mut params = HashMap::new();
        while buf.remaining() > 0 && !buf.next_is_null_byte() {
            let key = buf.read_cstring()?.to_string();
            let val = buf.read_cstring()?.to_string();
            params.insert(key, val);
        }

        Ok(StartupMessage::StartupRequest { version, params })
    }

    fn decode_query(buf: &mut Cursor<'_>) -> Result<FrontendMessage> {
        Ok(FrontendMessage::Query {
            sql: buf.read_cstring()?.to_string(),
        })
    }

    fn decode_parse(buf: &mut Cursor<'_>) -> Result<FrontendMessage> {
        let name = buf.read_cstring()?.to_string();
        let sql = buf.read_cstring()?.to_string();
        let param_types = buf.read_list(|buf| buf.read_i32())?;
        Ok(FrontendMessage::Parse {
            name,
            sql,
            param_types,
        })
    }

    fn decode_bind(buf: &mut Cursor<'_>) -> Result<FrontendMessage> {
        let portal = buf.read_cstring()?.to_string();
        let statement = buf.read_cstring()?.to_string();
        let param_formats = buf.read_list(|buf| buf.read_i16())?;
        let param_values = buf.read_list(|buf| {
            let len = buf.read_i32()?;
            if len == -1 {
                return Ok(None);
            }
            let len = usize::try_from(len).map_err(|_| PgSrvError::MsgTruncated)?;
            Ok(Some(buf.read_bytes(len)?.to_vec()))
        })?;
        let result_formats = buf.read_list(|buf| buf.read_i16())?;

        Ok(FrontendMessage::Bind {
            portal,
            statement,
            param_formats,
            param_values,
            result_formats,
        })
    }

    fn decode_describe(buf: &mut Cursor<'_>) -> Result<FrontendMessage> {
        let object_type = DescribeObjectType::try_from(buf.read_u8()?)
            .map_err(PgSrvError::InvalidDescribeObjectType)?;
        let name = buf.read_cstring()?.to_string();

        Ok(FrontendMessage::Describe { object_type, name })
    }

    fn decode_close(buf: &mut Cursor<'_>) -> Result<FrontendMessage> {
        let object_type = DescribeObjectType::try_from(buf.read_u8()?)
            .map_err(PgSrvError::InvalidDescribeObjectType)?;
        let name = buf.read_cstring()?.to_string();

        Ok(FrontendMessage::Close { object_type, name })
    }

    fn decode_execute(buf: &mut Cursor<'_>) -> Result<FrontendMessage> {
        let portal = buf.read_cstring()?.to_string();
        let max_rows = buf.read_i32()?;
        Ok(FrontendMessage::Execute { portal, max_rows })
    }

    fn encode_value_as_text(value: &Value, buf: &mut BytesMut) -> Result<()> {
        if value.is_null() {
            buf.put_i32(-1);
            return Ok(());
        }

        // Write placeholder length.
        let len_idx = buf.len();
        buf.put_i32(0);

        value.write_text(buf)?;

        // Note the value of length does not include itself.
        let val_len = buf.len() - len_idx - 4;
        let val_len = i32::try_from(val_len).map_err(|_| PgSrvError::MsgTooLarge(val_len))?;
        buf[len_idx..len_idx + 4].copy_from_slice(&i32::to_be_bytes(val_len));

        Ok(())
    }
}

impl Encoder<BackendMessage> for PgCodec {
    type Error = PgSrvError;

    fn encode(&mut self, item: BackendMessage, dst: &mut BytesMut) -> Result<()> {
        let byte = match &item {
            BackendMessage::AuthenticationOk => b'R',
            BackendMessage::EmptyQueryResponse => b'I',
            BackendMessage::ParameterStatus { .. } => b'S',
            BackendMessage::ReadyForQuery(_) => b'Z',
            BackendMessage::CommandComplete { .. } => b'C',
            BackendMessage::RowDescription(_) => b'T',
            BackendMessage::DataRow(_) => b'D',
            BackendMessage::ErrorResponse(_) => b'E',
            BackendMessage::ParameterDescription(_) => b't',
            BackendMessage::ParseComplete => b'1',
            BackendMessage::BindComplete => b'2',
            BackendMessage::CloseComplete => b'3',
            BackendMessage::NoData => b'n',
        };
        dst.put_u8(byte);

        // Length placeholder.
        let len_idx = dst.len();
        dst.put_u32(0);

        match item {
            BackendMessage::AuthenticationOk => dst.put_i32(0),
            BackendMessage::EmptyQueryResponse => (),
            BackendMessage::ParseComplete => (),
            BackendMessage::BindComplete => (),
            BackendMessage::CloseComplete => (),
            BackendMessage::NoData => (),
            BackendMessage::ParameterStatus { key, val } => {
                dst.put_cstring(&key);
                dst.put_cstring(&val);
            }
            BackendMessage::ReadyForQuery(status) => match status {
                TransactionStatus::Idle => dst.put_u8(b'I'),
                TransactionStatus::InBlock => dst.put_u8(b'T'),
                TransactionStatus::Failed => dst.put_u8(b'E'),
            },
            BackendMessage::CommandComplete { tag } => dst.put_cstring(&tag),
            BackendMessage::RowDescription(descs) => {
                let num = i16::try_from(descs.len())
                    .map_err(|_| PgSrvError::MsgTooLarge(descs.len()))?;
                dst.put_i16(num);
                for desc in descs.into_iter() {
                    dst.put_cstring(&desc.name);
                    dst.put_i32(desc.table_id);
                    dst.put_i16(desc.col_id);
                    dst.put_i32(desc.obj_id);
                    dst.put_i16(desc.type_size);
                    dst.put_i32(desc.type_mod);
                    dst.put_i16(desc.format);
                }
            }
            BackendMessage::DataRow(values) => {
                let num = i16::try_from(values.len())
                    .map_err(|_| PgSrvError::MsgTooLarge(values.len()))?;
                dst.put_i16(num);
                for value in values.iter() {
                    Self::encode_value_as_text(value, dst)?;
                }
            }
            BackendMessage::ParameterDescription(oids) => {
                let num =
                    i16::try_from(oids.len()).map_err(|_| PgSrvError::MsgTooLarge(oids.len()))?;
                dst.put_i16(num);
                for oid in oids {
                    dst.put_i32(oid);
                }
            }
            BackendMessage::ErrorResponse(error) => {
                // See https://www.postgresql.org/docs/current/protocol-error-fields.html

                // Severity
                dst.put_u8(b'S');
                dst.put_cstring(error.severity.as_str());
                dst.put_u8(b'V');
                dst.put_cstring(error.severity.as_str());

                // SQLSTATE error code
                dst.put_u8(b'C');
                dst.put_cstring(error.code.as_code_str());

                // Message
                dst.put_u8(b'M');
                dst.put_cstring(&error.message);

                // Terminate message.
                dst.put_u8(0);
            }
        }

        let msg_len = dst.len() - len_idx;
        let msg_len = i32::try_from(msg_len).map_err(|_| PgSrvError::MsgTooLarge(msg_len))?;
        dst[len_idx..len_idx + 4].copy_from_slice(&i32::to_be_bytes(msg_len));

        Ok(())
    }
}

impl Decoder for PgCodec {
    type Item = FrontendMessage;
    type Error = PgSrvError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Every message has a type byte, and an i32 for msg length. Return
        // early if we don't even have those available.
        if src.len() < 5 {
            return Ok(None);
        }
        // Index directly into the buffer to avoid advancing the cursor forward.
        let msg_type = src[0];
        let msg_len = i32::from_be_bytes([src[1], src[2], src[3], src[4]]);
        let msg_len = match usize::try_from(msg_len) {
            Ok(len) if len < 4 => return Err(PgSrvError::MsgTruncated),
            Ok(len) if len > MAX_MESSAGE_LEN => return Err(PgSrvError::MsgTooLarge(len)),
            Ok(len) => len,
            Err(_) => return Err(PgSrvError::MsgTruncated),
        };

        // Not enough bytes to read the full message yet.
        if src.len() < msg_len + 1 {
            src.reserve(msg_len + 1 - src.len());
            return Ok(None);
        }

        let buf = src.split_to(msg_len + 1);
        let mut buf = Cursor::new(&buf[5..]);

        let msg = match msg_type {
            b'Q' => Self::decode_query(&mut buf)?,
            b'P' => Self::decode_parse(&mut buf)?,
            b'B' => Self::decode_bind(&mut buf)?,
            b'D' => Self::decode_describe(&mut buf)?,
            b'E' => Self::decode_execute(&mut buf)?,
            b'C' => Self::decode_close(&mut buf)?,
            b'S' => FrontendMessage::Sync,
            b'H' => FrontendMessage::Flush,
            b'X' => FrontendMessage::Terminate,
            other => return Err(PgSrvError::InvalidMsgType(other)),
        };

        Ok(Some(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ErrorResponse, FieldDescription, SqlState};
    use postgres_protocol::message::backend::Message;
    use postgres_protocol::message::frontend;

    fn decode_one(buf: &mut BytesMut) -> FrontendMessage {
        PgCodec.decode(buf).unwrap().unwrap()
    }

    #[test]
    fn decode_query_and_terminate() {
        let mut buf = BytesMut::new();
        frontend::query("select 1", &mut buf).unwrap();
        frontend::terminate(&mut buf);

        match decode_one(&mut buf) {
            FrontendMessage::Query { sql } => assert_eq!("select 1", sql),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(decode_one(&mut buf), FrontendMessage::Terminate));
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_partial_message() {
        let mut full = BytesMut::new();
        frontend::query("select 1", &mut full).unwrap();

        let mut partial = BytesMut::from(&full[..6]);
        assert!(PgCodec.decode(&mut partial).unwrap().is_none());
        partial.extend_from_slice(&full[6..]);
        assert!(matches!(
            decode_one(&mut partial),
            FrontendMessage::Query { .. }
        ));
    }

    #[test]
    fn decode_extended_messages() {
        let mut buf = BytesMut::new();
        frontend::parse("", "select $1", [25], &mut buf).unwrap();
        frontend::bind(
            "",
            "",
            [0],
            [Some("abc"), None],
            |v, buf| match v {
                Some(v) => {
                    buf.put_slice(v.as_bytes());
                    Ok(postgres_protocol::IsNull::No)
                }
                None => Ok(postgres_protocol::IsNull::Yes),
            },
            [0],
            &mut buf,
        )
        .map_err(|_| "bind")
        .unwrap();
        frontend::describe(b'P', "", &mut buf).unwrap();
        frontend::execute("", 0, &mut buf).unwrap();
        frontend::sync(&mut buf);

        match decode_one(&mut buf) {
            FrontendMessage::Parse {
                sql, param_types, ..
            } => {
                assert_eq!("select $1", sql);
                assert_eq!(vec![25], param_types);
            }
            other => panic!("unexpected: {other:?}"),
        }
        match decode_one(&mut buf) {
            FrontendMessage::Bind { param_values, .. } => {
                assert_eq!(vec![Some(b"abc".to_vec()), None], param_values);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            decode_one(&mut buf),
            FrontendMessage::Describe {
                object_type: DescribeObjectType::Portal,
                ..
            }
        ));
        assert!(matches!(
            decode_one(&mut buf),
            FrontendMessage::Execute { max_rows: 0, .. }
        ));
        assert!(matches!(decode_one(&mut buf), FrontendMessage::Sync));
    }

    #[test]
    fn decode_close() {
        let mut buf = BytesMut::new();
        frontend::close(b'S', "s0", &mut buf).unwrap();
        frontend::close(b'P', "", &mut buf).unwrap();
        frontend::sync(&mut buf);

        match decode_one(&mut buf) {
            FrontendMessage::Close { object_type, name } => {
                assert_eq!(DescribeObjectType::Statement, object_type);
                assert_eq!("s0", name);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            decode_one(&mut buf),
            FrontendMessage::Close {
                object_type: DescribeObjectType::Portal,
                ..
            }
        ));
        assert!(matches!(decode_one(&mut buf), FrontendMessage::Sync));

        let mut buf = BytesMut::new();
        buf.put_u8(b'C');
        buf.put_i32(7);
        buf.put_slice(b"X\0\0");
        assert!(matches!(
            PgCodec.decode(&mut buf),
            Err(PgSrvError::InvalidDescribeObjectType(b'X'))
        ));
    }

    #[test]
    fn decode_unknown_type() {
        let mut buf = BytesMut::new();
        buf.put_u8(b'?');
        buf.put_i32(4);
        assert!(matches!(
            PgCodec.decode(&mut buf),
            Err(PgSrvError::InvalidMsgType(b'?'))
        ));
    }

    #[test]
    fn decode_truncated_body() {
        // Execute claiming a body but missing the row limit.
        let mut buf = BytesMut::new();
        buf.put_u8(b'E');
        buf.put_i32(5);
        buf.put_u8(0);
        assert!(matches!(
            PgCodec.decode(&mut buf),
            Err(PgSrvError::MsgTruncated)
        ));
    }

    #[test]
    fn encode_round_trips_through_client_parser() {
        let mut buf = BytesMut::new();
        let msgs = vec![
            BackendMessage::AuthenticationOk,
            BackendMessage::RowDescription(vec![FieldDescription::new_named("a")]),
            BackendMessage::DataRow(vec![Value::Integer(1), Value::Null]),
            BackendMessage::CommandComplete {
                tag: "SELECT 1".to_string(),
            },
            BackendMessage::CloseComplete,
            ErrorResponse::error(SqlState::InternalError, "oops").into(),
            BackendMessage::ReadyForQuery(TransactionStatus::Idle),
        ];
        for msg in msgs {
            PgCodec.encode(msg, &mut buf).unwrap();
        }

        assert!(matches!(
            Message::parse(&mut buf).unwrap(),
            Some(Message::AuthenticationOk)
        ));
        assert!(matches!(
            Message::parse(&mut buf).unwrap(),
            Some(Message::RowDescription(_))
        ));
        match Message::parse(&mut buf).unwrap() {
            Some(Message::DataRow(body)) => {
                // "1" followed by a null.
                assert_eq!(b"\x00\x00\x00\x011\xff\xff\xff\xff", body.buffer());
            }
            _ => panic!("expected data row"),
        }
        match Message::parse(&mut buf).unwrap() {
            Some(Message::CommandComplete(body)) => assert_eq!("SELECT 1", body.tag().unwrap()),
            _ => panic!("expected command complete"),
        }
        assert!(matches!(
            Message::parse(&mut buf).unwrap(),
            Some(Message::CloseComplete)
        ));
        assert!(matches!(
            Message::parse(&mut buf).unwrap(),
            Some(Message::ErrorResponse(_))
        ));
        match Message::parse(&mut buf).unwrap() {
            Some(Message::ReadyForQuery(body)) => assert_eq!(b'I', body.status()),
            _ => panic!("expected ready for query"),
        }
    }
}

use std::io;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

/// Largest bulk argument a client may send.
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;
/// Largest number of arguments in one command.
const MAX_ARGS: usize = 1024 * 1024;

pub struct RespReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> RespReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Read a Redis command (array of bulk strings). `None` on clean EOF.
    pub async fn read_command(&mut self) -> io::Result<Option<Vec<Vec<u8>>>> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            return Ok(None);
        }

        let Some(count) = line.strip_prefix('*') else {
            return Err(invalid("expected array"));
        };
        let count: usize = count
            .trim_end()
            .parse()
            .map_err(|_| invalid("invalid array length"))?;
        if count > MAX_ARGS {
            return Err(invalid("too many arguments"));
        }

        let mut args = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            args.push(self.read_bulk_string().await?);
        }

        Ok(Some(args))
    }

    async fn read_bulk_string(&mut self) -> io::Result<Vec<u8>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed mid-command",
            ));
        }

        let Some(len) = line.strip_prefix('$') else {
            return Err(invalid("expected bulk string"));
        };
        let len: i64 = len
            .trim_end()
            .parse()
            .map_err(|_| invalid("invalid bulk string length"))?;

        if len == -1 {
            return Ok(vec![]);
        }
        let len = usize::try_from(len).map_err(|_| invalid("invalid bulk string length"))?;
        if len > MAX_BULK_LEN {
            return Err(invalid("bulk string too large"));
        }

        let mut data = vec![0u8; len + 2];
        self.reader.read_exact(&mut data).await?;
        if &data[len..] != b"\r\n" {
            return Err(invalid("bad bulk string terminator"));
        }
        data.truncate(len);
        Ok(data)
    }
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

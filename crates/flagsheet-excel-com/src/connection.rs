//! Request/response framing over a pair of byte streams.

use std::io::{BufRead, Write};

use excel_com_protocol::{Command, Request, Response, ResponseData, ResponseResult};

use crate::error::{BridgeError, BridgeResult};

/// One JSON line out, one JSON line back
pub(crate) struct Connection<W, R> {
    writer: W,
    reader: R,
    next_id: u64,
}

impl<W: Write, R: BufRead> Connection<W, R> {
    pub(crate) fn new(writer: W, reader: R) -> Self {
        Self {
            writer,
            reader,
            next_id: 1,
        }
    }

    /// Send `command` and wait for its response
    pub(crate) fn send(&mut self, command: Command) -> BridgeResult<Option<ResponseData>> {
        let id = self.next_id;
        self.next_id += 1;

        let json = serde_json::to_string(&Request { id, command })?;
        tracing::trace!(%json, "bridge request");
        writeln!(self.writer, "{json}").map_err(BridgeError::Send)?;
        self.writer.flush().map_err(BridgeError::Send)?;

        let mut line = String::new();
        let read = self.reader.read_line(&mut line).map_err(BridgeError::Read)?;
        if read == 0 {
            return Err(BridgeError::NotRunning);
        }
        let response: Response = serde_json::from_str(line.trim_end())?;
        if response.id != id {
            // id 0 is the bridge failing to parse our line at all
            if let (0, ResponseResult::Error { message }) = (response.id, &response.result) {
                return Err(BridgeError::Remote(message.clone()));
            }
            return Err(BridgeError::IdMismatch {
                expected: id,
                got: response.id,
            });
        }

        match response.result {
            ResponseResult::Ok { data } => Ok(data),
            ResponseResult::Error { message } => Err(BridgeError::Remote(message)),
        }
    }
}
